//! # Global Verdict
//!
//! The single shared value of the whole analysis. It starts at
//! [`Verdict::Running`] and transitions to a terminal value exactly once;
//! whichever worker or coordinator wins the CAS owns the verdict, every
//! later attempt is a no-op. The transition is what triggers cancellation.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Outcome of the distributed analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Analysis in progress.
    Running,
    /// Global fixpoint reached, no violation reachable.
    Safe,
    /// A feasible violation was reconstructed.
    Unsafe,
    /// Resources exhausted or a worker failed; no conclusion.
    Unknown,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Verdict::Running)
    }

    fn to_u8(self) -> u8 {
        match self {
            Verdict::Running => 0,
            Verdict::Safe => 1,
            Verdict::Unsafe => 2,
            Verdict::Unknown => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Verdict::Safe,
            2 => Verdict::Unsafe,
            3 => Verdict::Unknown,
            _ => Verdict::Running,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Running => write!(f, "RUNNING"),
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Unsafe => write!(f, "UNSAFE"),
            Verdict::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Write-once verdict cell.
///
/// A single atomic holds the verdict; the first successful
/// compare-and-swap from `Running` wins and every later [`resolve`]
/// call returns `false` without touching the value.
///
/// [`resolve`]: VerdictCell::resolve
#[derive(Debug)]
pub struct VerdictCell {
    state: AtomicU8,
}

impl VerdictCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(Verdict::Running.to_u8()),
        }
    }

    /// Attempt the terminal transition. Returns `true` iff this call won.
    ///
    /// Attempting to resolve to `Running` is rejected outright.
    pub fn resolve(&self, verdict: Verdict) -> bool {
        if !verdict.is_terminal() {
            return false;
        }
        self.state
            .compare_exchange(
                Verdict::Running.to_u8(),
                verdict.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn get(&self) -> Verdict {
        Verdict::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_resolved(&self) -> bool {
        self.get().is_terminal()
    }
}

impl Default for VerdictCell {
    fn default() -> Self {
        Self::new()
    }
}
