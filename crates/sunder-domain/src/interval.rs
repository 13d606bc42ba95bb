//! # Interval Domain
//!
//! A complete example domain: intervals `[l, u] ⊆ ℤ ∪ {-∞, +∞}` over
//! named program variables, with join, widening, and containment-based
//! coverage. Block bodies are small statement lists (assign, add, havoc,
//! assume, assert); the interpreter over them is the inner block
//! analysis the engine delegates to.
//!
//! Join is the interval hull. Widening drops a bound to the matching
//! infinity as soon as it moved, so any ascending chain stabilizes after
//! at most two widenings per variable and bound.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use sunder_core::block::{BlockId, BlockNode, NodeId};
use sunder_core::{Direction, EngineError, Payload};

use crate::ops::{
    BlockAnalysis, BlockOutcome, DistributedAnalysis, Precision, ProceedDecision, ViolationHit,
};

// =============================================================================
// Extended integers and intervals
// =============================================================================

/// ℤ ∪ {-∞, +∞}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtInt {
    NegInf,
    Finite(i64),
    PosInf,
}

impl ExtInt {
    /// Shift by a finite delta; infinities absorb, finite overflow
    /// widens to the matching infinity.
    fn shift(self, delta: i64) -> Self {
        match self {
            ExtInt::NegInf => ExtInt::NegInf,
            ExtInt::PosInf => ExtInt::PosInf,
            ExtInt::Finite(v) => match v.checked_add(delta) {
                Some(r) => ExtInt::Finite(r),
                None if delta > 0 => ExtInt::PosInf,
                None => ExtInt::NegInf,
            },
        }
    }

    /// Predecessor, saturating into -∞.
    fn pred(self) -> Self {
        self.shift(-1)
    }

    /// Successor, saturating into +∞.
    fn succ(self) -> Self {
        self.shift(1)
    }
}

impl Ord for ExtInt {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        match (self, other) {
            (ExtInt::NegInf, ExtInt::NegInf) => Equal,
            (ExtInt::NegInf, _) => Less,
            (_, ExtInt::NegInf) => Greater,
            (ExtInt::PosInf, ExtInt::PosInf) => Equal,
            (ExtInt::PosInf, _) => Greater,
            (_, ExtInt::PosInf) => Less,
            (ExtInt::Finite(a), ExtInt::Finite(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ExtInt {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ExtInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtInt::NegInf => write!(f, "-inf"),
            ExtInt::PosInf => write!(f, "+inf"),
            ExtInt::Finite(v) => write!(f, "{}", v),
        }
    }
}

/// A non-empty interval. Emptiness is `Option<Interval>` at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: ExtInt,
    pub hi: ExtInt,
}

impl Interval {
    pub fn new(lo: ExtInt, hi: ExtInt) -> Option<Self> {
        if lo <= hi {
            Some(Self { lo, hi })
        } else {
            None
        }
    }

    pub const fn top() -> Self {
        Self {
            lo: ExtInt::NegInf,
            hi: ExtInt::PosInf,
        }
    }

    pub const fn point(v: i64) -> Self {
        Self {
            lo: ExtInt::Finite(v),
            hi: ExtInt::Finite(v),
        }
    }

    pub fn is_top(&self) -> bool {
        self.lo == ExtInt::NegInf && self.hi == ExtInt::PosInf
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    pub fn contains_value(&self, v: i64) -> bool {
        self.lo <= ExtInt::Finite(v) && ExtInt::Finite(v) <= self.hi
    }

    /// Interval hull.
    pub fn join(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// `None` when the intersection is empty.
    pub fn meet(&self, other: &Interval) -> Option<Interval> {
        Interval::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    /// Standard interval widening: a bound that moved jumps to the
    /// matching infinity.
    pub fn widen(&self, next: &Interval) -> Interval {
        Interval {
            lo: if next.lo < self.lo { ExtInt::NegInf } else { self.lo },
            hi: if next.hi > self.hi { ExtInt::PosInf } else { self.hi },
        }
    }

    pub fn shift(&self, delta: i64) -> Interval {
        Interval {
            lo: self.lo.shift(delta),
            hi: self.hi.shift(delta),
        }
    }

    /// Parse the `[lo,hi]` payload encoding.
    pub fn parse(s: &str) -> Result<Interval, String> {
        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| format!("interval '{}' is not bracketed", s))?;
        let (lo, hi) = inner
            .split_once(',')
            .ok_or_else(|| format!("interval '{}' has no comma", s))?;
        let parse_bound = |b: &str| -> Result<ExtInt, String> {
            match b.trim() {
                "-inf" => Ok(ExtInt::NegInf),
                "+inf" | "inf" => Ok(ExtInt::PosInf),
                v => v
                    .parse()
                    .map(ExtInt::Finite)
                    .map_err(|_| format!("bad interval bound '{}'", v)),
            }
        };
        Interval::new(parse_bound(lo)?, parse_bound(hi)?)
            .ok_or_else(|| format!("interval '{}' is empty", s))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.lo, self.hi)
    }
}

// =============================================================================
// Abstract state
// =============================================================================

/// Reserved payload key carrying the represented program location.
const LOCATION_KEY: &str = "@location";

/// Interval-abstracted program state at one location. A variable absent
/// from `vars` is unconstrained; constructors drop top intervals so
/// equality stays structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalState {
    pub location: NodeId,
    pub vars: BTreeMap<String, Interval>,
}

impl IntervalState {
    pub fn unconstrained(location: NodeId) -> Self {
        Self {
            location,
            vars: BTreeMap::new(),
        }
    }

    pub fn get(&self, var: &str) -> Interval {
        self.vars.get(var).copied().unwrap_or_else(Interval::top)
    }

    pub fn set(&mut self, var: &str, interval: Interval) {
        if interval.is_top() {
            self.vars.remove(var);
        } else {
            self.vars.insert(var.to_string(), interval);
        }
    }

    pub fn relocate(mut self, location: NodeId) -> Self {
        self.location = location;
        self
    }

    /// Pointwise hull. Variables constrained on only one side become
    /// unconstrained.
    pub fn join(&self, other: &IntervalState) -> IntervalState {
        let mut vars = BTreeMap::new();
        for (name, a) in &self.vars {
            if let Some(b) = other.vars.get(name) {
                let j = a.join(b);
                if !j.is_top() {
                    vars.insert(name.clone(), j);
                }
            }
        }
        IntervalState {
            location: self.location,
            vars,
        }
    }

    pub fn widen(&self, next: &IntervalState) -> IntervalState {
        let mut vars = BTreeMap::new();
        for (name, old) in &self.vars {
            if let Some(new) = next.vars.get(name) {
                let w = old.widen(new);
                if !w.is_top() {
                    vars.insert(name.clone(), w);
                }
            }
        }
        IntervalState {
            location: self.location,
            vars,
        }
    }

    /// `self ⊑ other`: every constraint of `other` contains the
    /// corresponding interval of `self`.
    pub fn is_subsumed_by(&self, other: &IntervalState) -> bool {
        self.location == other.location
            && other
                .vars
                .iter()
                .all(|(name, theirs)| theirs.contains(&self.get(name)))
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(LOCATION_KEY.to_string(), self.location.to_string());
        for (name, interval) in &self.vars {
            payload.insert(name.clone(), interval.to_string());
        }
        payload
    }

    pub fn from_payload(payload: &Payload, direction: Direction) -> Result<Self, EngineError> {
        let location = payload
            .get(LOCATION_KEY)
            .ok_or_else(|| EngineError::malformed("missing @location", direction))?
            .parse()
            .map_err(|_| EngineError::malformed("unparsable @location", direction))?;
        let mut state = IntervalState::unconstrained(location);
        for (key, value) in payload {
            if key.starts_with('@') {
                continue;
            }
            let interval = Interval::parse(value)
                .map_err(|e| EngineError::malformed(e, direction))?;
            state.set(key, interval);
        }
        Ok(state)
    }
}

// =============================================================================
// Block bodies
// =============================================================================

/// Comparison operator of guards and assertions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// One statement of a block body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stmt {
    /// `var := value`
    Assign { var: String, value: i64 },
    /// `var := var + delta`
    AddConst { var: String, delta: i64 },
    /// Forget everything about `var`.
    Havoc { var: String },
    /// Guard: execution continues only when `var <op> value` holds.
    Assume { var: String, cmp: CmpOp, value: i64 },
    /// Safety check: `var <op> value` must hold, else a violation.
    Assert { var: String, cmp: CmpOp, value: i64 },
}

/// Meet `interval` with the satisfying region of `cmp value`.
fn refine(interval: Interval, cmp: CmpOp, value: i64) -> Option<Interval> {
    let v = ExtInt::Finite(value);
    match cmp {
        CmpOp::Lt => interval.meet(&Interval::new(ExtInt::NegInf, v.pred())?),
        CmpOp::Le => interval.meet(&Interval { lo: ExtInt::NegInf, hi: v }),
        CmpOp::Gt => interval.meet(&Interval::new(v.succ(), ExtInt::PosInf)?),
        CmpOp::Ge => interval.meet(&Interval { lo: v, hi: ExtInt::PosInf }),
        CmpOp::Eq => interval.meet(&Interval::point(value)),
        CmpOp::Ne => {
            // Only boundary trimming is exact in the interval domain.
            if interval.lo == v && interval.hi == v {
                None
            } else if interval.lo == v {
                Interval::new(v.succ(), interval.hi)
            } else if interval.hi == v {
                Interval::new(interval.lo, v.pred())
            } else {
                Some(interval)
            }
        }
    }
}

/// Meet `interval` with the violating region of `cmp value` (the
/// negation of `refine`). Over-approximate where a single interval
/// cannot express the exact complement.
fn refute(interval: Interval, cmp: CmpOp, value: i64) -> Option<Interval> {
    match cmp {
        CmpOp::Lt => refine(interval, CmpOp::Ge, value),
        CmpOp::Le => refine(interval, CmpOp::Gt, value),
        CmpOp::Gt => refine(interval, CmpOp::Le, value),
        CmpOp::Ge => refine(interval, CmpOp::Lt, value),
        CmpOp::Eq => refine(interval, CmpOp::Ne, value),
        CmpOp::Ne => refine(interval, CmpOp::Eq, value),
    }
}

// =============================================================================
// The inner block analysis
// =============================================================================

/// Interprets block bodies over [`IntervalState`]s, forward and backward.
pub struct IntervalAnalysis {
    bodies: HashMap<BlockId, Vec<Stmt>>,
}

impl IntervalAnalysis {
    pub fn new(bodies: HashMap<BlockId, Vec<Stmt>>) -> Self {
        Self { bodies }
    }

    fn body(&self, block: &BlockNode) -> Result<&[Stmt], EngineError> {
        self.bodies
            .get(&block.id)
            .map(|b| b.as_slice())
            .ok_or_else(|| EngineError::analysis(block.id.clone(), "no body registered"))
    }

    /// Forward run from the block entry. Returns `None` exit when the
    /// body is infeasible, plus the first violation encountered.
    fn run_forward(
        &self,
        entry: &IntervalState,
        block: &BlockNode,
    ) -> Result<BlockOutcome<IntervalState>, EngineError> {
        let mut state = entry.clone();
        let mut violation = None;
        for stmt in self.body(block)? {
            match stmt {
                Stmt::Assign { var, value } => state.set(var, Interval::point(*value)),
                Stmt::AddConst { var, delta } => {
                    let shifted = state.get(var).shift(*delta);
                    state.set(var, shifted);
                }
                Stmt::Havoc { var } => state.set(var, Interval::top()),
                Stmt::Assume { var, cmp, value } => match refine(state.get(var), *cmp, *value) {
                    Some(iv) => state.set(var, iv),
                    None => return Ok(BlockOutcome::infeasible()),
                },
                Stmt::Assert { var, cmp, value } => {
                    if violation.is_none() {
                        if let Some(bad) = refute(state.get(var), *cmp, *value) {
                            let mut condition = state.clone().relocate(block.exit_location);
                            condition.set(var, bad);
                            violation = Some(ViolationHit {
                                location: block.exit_location,
                                condition,
                            });
                        }
                    }
                    // Execution continues only on the satisfying part.
                    match refine(state.get(var), *cmp, *value) {
                        Some(iv) => state.set(var, iv),
                        None => {
                            return Ok(BlockOutcome {
                                exit_state: None,
                                violation,
                                root_feasible: false,
                            })
                        }
                    }
                }
            }
        }
        Ok(BlockOutcome {
            exit_state: Some(state.relocate(block.exit_location)),
            violation,
            root_feasible: false,
        })
    }

    /// Backward run of a violation condition from the block exit to its
    /// entry. Returns `None` exit when the condition is infeasible
    /// through this block.
    fn run_backward(
        &self,
        condition: &IntervalState,
        block: &BlockNode,
    ) -> Result<BlockOutcome<IntervalState>, EngineError> {
        let mut state = condition.clone();
        for stmt in self.body(block)?.iter().rev() {
            match stmt {
                Stmt::Assign { var, value } => {
                    if !state.get(var).contains_value(*value) {
                        return Ok(BlockOutcome::infeasible());
                    }
                    state.set(var, Interval::top());
                }
                Stmt::AddConst { var, delta } => {
                    let shifted = state.get(var).shift(-*delta);
                    state.set(var, shifted);
                }
                Stmt::Havoc { var } => state.set(var, Interval::top()),
                Stmt::Assume { var, cmp, value } => match refine(state.get(var), *cmp, *value) {
                    Some(iv) => state.set(var, iv),
                    None => return Ok(BlockOutcome::infeasible()),
                },
                // The violating path aborted at its assert; earlier
                // asserts constrain nothing backward.
                Stmt::Assert { .. } => {}
            }
        }
        let entry_state = state.relocate(block.entry_location);
        let root_feasible = block.is_root();
        Ok(BlockOutcome {
            exit_state: Some(entry_state),
            violation: None,
            root_feasible,
        })
    }
}

impl BlockAnalysis<IntervalState> for IntervalAnalysis {
    fn analyze(
        &self,
        entry: &IntervalState,
        block: &BlockNode,
        direction: Direction,
    ) -> Result<BlockOutcome<IntervalState>, EngineError> {
        match direction {
            Direction::Forward => self.run_forward(entry, block),
            Direction::Backward => self.run_backward(entry, block),
        }
    }
}

// =============================================================================
// Capability wiring
// =============================================================================

/// Assemble the full operator set for the interval domain.
pub fn interval_analysis(
    bodies: HashMap<BlockId, Vec<Stmt>>,
    widening_threshold: u32,
) -> DistributedAnalysis<IntervalState> {
    DistributedAnalysis {
        serialize: Arc::new(|s: &IntervalState| s.to_payload()),
        deserialize: Arc::new(|payload, _block, direction| {
            IntervalState::from_payload(payload, direction)
        }),
        proceed: Arc::new(|state: &IntervalState, block, direction| {
            let expected = match direction {
                Direction::Forward => block.entry_location,
                Direction::Backward => block.exit_location,
            };
            if state.location == expected {
                ProceedDecision::Proceed
            } else {
                ProceedDecision::Stop
            }
        }),
        combine: Arc::new(|existing: &IntervalState, incoming, _precision| {
            if existing.location != incoming.location {
                return Err(EngineError::incompatible(format!(
                    "summaries at locations {} and {} cannot be merged",
                    existing.location, incoming.location
                )));
            }
            Ok(existing.join(incoming))
        }),
        widen: Arc::new(|old: &IntervalState, new| old.widen(new)),
        covered: Arc::new(|candidate: &IntervalState, existing| {
            candidate.is_subsumed_by(existing)
        }),
        equal: Arc::new(|a: &IntervalState, b| a == b),
        initial: Arc::new(|block, direction| {
            let location = match direction {
                Direction::Forward => block.entry_location,
                Direction::Backward => block.exit_location,
            };
            IntervalState::unconstrained(location)
        }),
        inner: Arc::new(IntervalAnalysis::new(bodies)),
        precision: Precision::default(),
        widening_threshold,
    }
}
