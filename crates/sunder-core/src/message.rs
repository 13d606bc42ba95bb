//! # Message Envelope
//!
//! The only thing workers exchange: an immutable envelope carrying a
//! direction, a kind, the sender block, a target program location, and a
//! domain-opaque payload. The payload is a flat `string -> string` map
//! produced by the domain's serialize operator; it is only meaningful
//! together with the direction and the domain that produced it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::block::{BlockId, NodeId};

/// Domain-opaque serialized abstract state.
pub type Payload = BTreeMap<String, String>;

/// Propagation direction of a summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Reachable postconditions, entry to exit.
    Forward,
    /// Violation conditions, exit to entry.
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

/// What a message means to its receiver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A forward summary: states reachable at the sender's exit.
    Postcondition,
    /// A backward summary: states from which an error location is reachable.
    ViolationCondition,
    /// The receiver already holds an equivalent summary (coverage notice).
    FoundEquivalent,
    /// Per-worker counters, sent once when a worker finishes.
    Statistics,
    /// Cooperative cancellation, fanned out by the orchestrator.
    Shutdown,
}

/// Immutable message envelope. Built once by the sending worker,
/// cloned (never mutated) on every hop after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: BlockId,
    pub target_location: NodeId,
    pub direction: Direction,
    pub kind: MessageKind,
    /// Serialized abstract state; opaque to the engine.
    #[serde(default)]
    pub payload: Payload,
    /// Blocks this summary has passed through, for counterexample
    /// reconstruction and ping-pong detection.
    #[serde(default)]
    pub visited_blocks: BTreeSet<BlockId>,
    /// First message ever sent on this edge by the sender.
    pub is_first: bool,
    /// Sender will send nothing further (it is finishing).
    pub is_final: bool,
}

impl Message {
    /// A forward summary of the sender's exit states.
    pub fn postcondition(
        sender: impl Into<BlockId>,
        target_location: NodeId,
        payload: Payload,
        visited_blocks: BTreeSet<BlockId>,
    ) -> Self {
        Self {
            sender: sender.into(),
            target_location,
            direction: Direction::Forward,
            kind: MessageKind::Postcondition,
            payload,
            visited_blocks,
            is_first: false,
            is_final: false,
        }
    }

    /// A backward violation condition headed for the program entry.
    pub fn violation_condition(
        sender: impl Into<BlockId>,
        target_location: NodeId,
        payload: Payload,
        visited_blocks: BTreeSet<BlockId>,
    ) -> Self {
        Self {
            sender: sender.into(),
            target_location,
            direction: Direction::Backward,
            kind: MessageKind::ViolationCondition,
            payload,
            visited_blocks,
            is_first: false,
            is_final: false,
        }
    }

    /// Coverage notice: the sender already holds a summary subsuming the
    /// one it would otherwise re-broadcast.
    pub fn found_equivalent(sender: impl Into<BlockId>, target_location: NodeId, direction: Direction) -> Self {
        Self {
            sender: sender.into(),
            target_location,
            direction,
            kind: MessageKind::FoundEquivalent,
            payload: Payload::new(),
            visited_blocks: BTreeSet::new(),
            is_first: false,
            is_final: false,
        }
    }

    /// Final per-worker counters.
    pub fn statistics(sender: impl Into<BlockId>, payload: Payload) -> Self {
        Self {
            sender: sender.into(),
            target_location: 0,
            direction: Direction::Forward,
            kind: MessageKind::Statistics,
            payload,
            visited_blocks: BTreeSet::new(),
            is_first: false,
            is_final: true,
        }
    }

    /// Cancellation signal from the orchestrator.
    pub fn shutdown() -> Self {
        Self {
            sender: BlockId::new(),
            target_location: 0,
            direction: Direction::Forward,
            kind: MessageKind::Shutdown,
            payload: Payload::new(),
            visited_blocks: BTreeSet::new(),
            is_first: false,
            is_final: true,
        }
    }

    pub fn with_first(mut self, is_first: bool) -> Self {
        self.is_first = is_first;
        self
    }

    pub fn with_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    /// True for the kinds that carry an abstract state to combine.
    pub fn carries_summary(&self) -> bool {
        matches!(
            self.kind,
            MessageKind::Postcondition | MessageKind::ViolationCondition
        )
    }

    /// One-line rendering for diagnostics records.
    pub fn summary(&self) -> String {
        format!(
            "{:?} {} from '{}' @{} ({} visited)",
            self.kind,
            self.direction,
            self.sender,
            self.target_location,
            self.visited_blocks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postcondition_defaults() {
        let m = Message::postcondition("B1", 10, Payload::new(), BTreeSet::new());
        assert_eq!(m.direction, Direction::Forward);
        assert_eq!(m.kind, MessageKind::Postcondition);
        assert!(!m.is_first);
        assert!(!m.is_final);
        assert!(m.carries_summary());
    }

    #[test]
    fn test_violation_condition_is_backward() {
        let m = Message::violation_condition("B2", 10, Payload::new(), BTreeSet::new());
        assert_eq!(m.direction, Direction::Backward);
        assert!(m.carries_summary());
    }

    #[test]
    fn test_statistics_is_final_and_not_a_summary() {
        let mut payload = Payload::new();
        payload.insert("received".to_string(), "3".to_string());
        let m = Message::statistics("B1", payload);
        assert_eq!(m.kind, MessageKind::Statistics);
        assert!(m.is_final);
        assert!(!m.carries_summary());
    }

    #[test]
    fn test_shutdown_is_final_and_carries_nothing() {
        let m = Message::shutdown();
        assert!(m.is_final);
        assert!(!m.carries_summary());
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Forward.opposite(), Direction::Backward);
        assert_eq!(Direction::Backward.opposite(), Direction::Forward);
    }

    #[test]
    fn test_serde_round_trip_preserves_kind_tags() {
        let m = Message::postcondition("B1", 7, Payload::new(), BTreeSet::new()).with_first(true);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"postcondition\""));
        assert!(json.contains("\"forward\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sender, "B1");
        assert!(back.is_first);
    }
}
