//! # Quiescence Tracking
//!
//! Outstanding-message counting at the coordinator. Every message is
//! charged to the shared counter when it is put on its way and retired
//! only after the receiving worker has fully processed it. Because a
//! worker charges every child message it emits before retiring the
//! parent, the counter can only read zero when no worker holds
//! unprocessed work and nothing is in flight: a true global quiescence.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::watch;

pub struct QuiescenceTracker {
    pending: AtomicI64,
    quiescent_tx: watch::Sender<bool>,
}

impl QuiescenceTracker {
    pub fn new() -> Self {
        let (quiescent_tx, _) = watch::channel(false);
        Self {
            pending: AtomicI64::new(0),
            quiescent_tx,
        }
    }

    /// Account for a message that is about to be deposited.
    pub fn charge(&self) {
        let before = self.pending.fetch_add(1, Ordering::AcqRel);
        if before == 0 {
            // Leaving quiescence (or the initial state).
            let _ = self.quiescent_tx.send(false);
        }
    }

    /// Account for a message whose processing has completed, including
    /// one that was coalesced away before delivery.
    pub fn retire(&self) {
        let before = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(before > 0, "retired more messages than charged");
        if before == 1 {
            let _ = self.quiescent_tx.send(true);
        }
    }

    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_quiescent(&self) -> bool {
        self.pending() == 0
    }

    /// Watch flipping to `true` whenever the counter reaches zero.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.quiescent_tx.subscribe()
    }
}

impl Default for QuiescenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_retire_balance() {
        let t = QuiescenceTracker::new();
        assert!(t.is_quiescent());
        t.charge();
        t.charge();
        assert_eq!(t.pending(), 2);
        t.retire();
        assert!(!t.is_quiescent());
        t.retire();
        assert!(t.is_quiescent());
    }

    #[tokio::test]
    async fn test_watch_fires_on_zero() {
        let t = QuiescenceTracker::new();
        let mut rx = t.subscribe();
        t.charge();
        t.retire();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_child_before_parent_keeps_counter_positive() {
        let t = QuiescenceTracker::new();
        t.charge(); // parent deposited
        t.charge(); // child charged before the parent is retired
        t.retire(); // parent done
        assert_eq!(t.pending(), 1);
        assert!(!t.is_quiescent());
    }
}
