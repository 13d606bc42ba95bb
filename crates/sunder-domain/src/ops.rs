//! # Distributed Operator Set
//!
//! Five pluggable operations plus a coverage predicate, supplied once at
//! configuration time per analysis. A [`DistributedAnalysis`] is a plain
//! capability struct: one `Arc` closure slot per operator and a trait
//! object for the inner (non-distributed) block analysis. No inheritance,
//! no downcasting; workers call through the slots and never inspect the
//! domain's internals.

use std::collections::BTreeMap;
use std::sync::Arc;

use sunder_core::block::{BlockNode, NodeId};
use sunder_core::{Direction, EngineError, Payload};

/// Outcome of the cheap relevance filter run before any expensive work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedDecision {
    /// The state is relevant to this block; analyze it.
    Proceed,
    /// The state does not apply here (wrong location); drop the message.
    Stop,
}

/// Domain-opaque precision handed to every combine call. The engine
/// never reads it; domains thread solver options or predicate sets
/// through it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precision(pub BTreeMap<String, String>);

/// A violation discovered by a forward block-local analysis.
#[derive(Debug, Clone)]
pub struct ViolationHit<S> {
    /// The designated error location that was reached.
    pub location: NodeId,
    /// Abstract condition describing the violating states, positioned at
    /// the block's exit so it can be propagated backward.
    pub condition: S,
}

/// Result of one block-local reachability computation.
#[derive(Debug, Clone)]
pub struct BlockOutcome<S> {
    /// Summary at the propagation boundary: the block's exit (forward)
    /// or entry (backward). `None` means the run was infeasible and
    /// there is nothing to propagate.
    pub exit_state: Option<S>,
    /// Error location reached during a forward run, if any.
    pub violation: Option<ViolationHit<S>>,
    /// Backward runs only: the condition stayed satisfiable all the way
    /// to the program entry, jointly with the entry precondition.
    pub root_feasible: bool,
}

impl<S> BlockOutcome<S> {
    pub fn infeasible() -> Self {
        Self {
            exit_state: None,
            violation: None,
            root_feasible: false,
        }
    }
}

/// The inner (non-distributed) analysis a block worker delegates to in
/// its analyze step. May block for a domain-dependent duration; that
/// stalls only the calling worker.
pub trait BlockAnalysis<S>: Send + Sync {
    fn analyze(
        &self,
        entry: &S,
        block: &BlockNode,
        direction: Direction,
    ) -> Result<BlockOutcome<S>, EngineError>;
}

pub type SerializeFn<S> = Arc<dyn Fn(&S) -> Payload + Send + Sync>;
pub type DeserializeFn<S> =
    Arc<dyn Fn(&Payload, &BlockNode, Direction) -> Result<S, EngineError> + Send + Sync>;
pub type ProceedFn<S> = Arc<dyn Fn(&S, &BlockNode, Direction) -> ProceedDecision + Send + Sync>;
pub type CombineFn<S> = Arc<dyn Fn(&S, &S, &Precision) -> Result<S, EngineError> + Send + Sync>;
pub type WidenFn<S> = Arc<dyn Fn(&S, &S) -> S + Send + Sync>;
pub type CoverageFn<S> = Arc<dyn Fn(&S, &S) -> bool + Send + Sync>;
pub type EqualFn<S> = Arc<dyn Fn(&S, &S) -> bool + Send + Sync>;
pub type InitialFn<S> = Arc<dyn Fn(&BlockNode, Direction) -> S + Send + Sync>;

/// The capability struct a worker is configured with.
///
/// Contract (not checked by the engine, required for termination and
/// soundness):
/// - `combine` is monotone, commutative, associative, and idempotent up
///   to `equal`;
/// - `widen` stabilizes any ascending chain in finitely many steps;
/// - `covered(candidate, existing)` holds when `existing` already implies
///   `candidate`;
/// - `serialize` is total; `proceed` is a pure function of its arguments.
pub struct DistributedAnalysis<S> {
    pub serialize: SerializeFn<S>,
    pub deserialize: DeserializeFn<S>,
    pub proceed: ProceedFn<S>,
    pub combine: CombineFn<S>,
    pub widen: WidenFn<S>,
    /// The coverage predicate: `covered(candidate, existing)`.
    pub covered: CoverageFn<S>,
    /// Domain equality, used to detect "no new information" combines.
    pub equal: EqualFn<S>,
    /// Initial ("true") state at a block boundary, used to seed the root.
    pub initial: InitialFn<S>,
    /// Handle to the inner block-local analysis.
    pub inner: Arc<dyn BlockAnalysis<S>>,
    pub precision: Precision,
    /// Per-edge revisit count past which `widen` replaces `combine`.
    pub widening_threshold: u32,
}

impl<S> Clone for DistributedAnalysis<S> {
    fn clone(&self) -> Self {
        Self {
            serialize: self.serialize.clone(),
            deserialize: self.deserialize.clone(),
            proceed: self.proceed.clone(),
            combine: self.combine.clone(),
            widen: self.widen.clone(),
            covered: self.covered.clone(),
            equal: self.equal.clone(),
            initial: self.initial.clone(),
            inner: self.inner.clone(),
            precision: self.precision.clone(),
            widening_threshold: self.widening_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sunder_core::block::BlockNode;

    struct NopAnalysis;

    impl BlockAnalysis<u64> for NopAnalysis {
        fn analyze(
            &self,
            entry: &u64,
            _block: &BlockNode,
            _direction: Direction,
        ) -> Result<BlockOutcome<u64>, EngineError> {
            Ok(BlockOutcome {
                exit_state: Some(*entry),
                violation: None,
                root_feasible: false,
            })
        }
    }

    /// A max-lattice over u64: combine = max, widen jumps to u64::MAX.
    fn max_lattice(threshold: u32) -> DistributedAnalysis<u64> {
        DistributedAnalysis {
            serialize: Arc::new(|s| {
                let mut p = Payload::new();
                p.insert("v".to_string(), s.to_string());
                p
            }),
            deserialize: Arc::new(|p, _b, d| {
                p.get("v")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| EngineError::malformed("missing 'v'", d))
            }),
            proceed: Arc::new(|_, _, _| ProceedDecision::Proceed),
            combine: Arc::new(|a, b, _| Ok((*a).max(*b))),
            widen: Arc::new(|_, _| u64::MAX),
            covered: Arc::new(|c, e| c <= e),
            equal: Arc::new(|a, b| a == b),
            initial: Arc::new(|_, _| 0),
            inner: Arc::new(NopAnalysis),
            precision: Precision::default(),
            widening_threshold: threshold,
        }
    }

    #[test]
    fn test_capability_slots_callable() {
        let d = max_lattice(3);
        let block = BlockNode::new("B1", 0, 1);
        let merged = (d.combine)(&3, &5, &d.precision).unwrap();
        assert_eq!(merged, 5);
        assert!((d.covered)(&3, &5));
        assert!((d.equal)(&5, &merged));
        let payload = (d.serialize)(&merged);
        let back = (d.deserialize)(&payload, &block, Direction::Forward).unwrap();
        assert_eq!(back, 5);
    }

    #[test]
    fn test_deserialize_reports_malformed() {
        let d = max_lattice(3);
        let block = BlockNode::new("B1", 0, 1);
        let err = (d.deserialize)(&Payload::new(), &block, Direction::Backward).unwrap_err();
        assert!(err.is_droppable());
    }

    #[test]
    fn test_clone_shares_operators() {
        let d = max_lattice(7);
        let e = d.clone();
        assert_eq!(e.widening_threshold, 7);
        assert_eq!((e.combine)(&1, &2, &e.precision).unwrap(), 2);
    }
}
