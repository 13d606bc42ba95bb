//! # Error Taxonomy
//!
//! Every failure mode the engine distinguishes. None of these is fatal to
//! the whole computation: malformed messages are dropped, incompatible
//! combines degrade the local worker to an Unknown contribution, and
//! cancellation is a cooperative exit rather than an error.

use std::fmt;

use crate::block::BlockId;
use crate::message::Direction;

/// Failure modes of the distributed engine and its domain operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Payload cannot be deserialized for the target domain/direction.
    /// Handling: drop the message, log, continue.
    MalformedMessage {
        reason: String,
        direction: Direction,
    },
    /// Two summaries are not mergeable in the domain's lattice.
    /// Handling: local worker degrades to an Unknown contribution.
    IncompatibleCombine { reason: String },
    /// Message references an unknown block or a malformed visited set.
    /// Handling: drop, warn, continue.
    ProtocolViolation { reason: String },
    /// The domain's block-local analysis failed (e.g. solver error).
    /// Handling: worker reports Unknown and finishes.
    AnalysisFailure { block: BlockId, reason: String },
    /// The orchestrator issued shutdown; cooperative exit, not a fault.
    CancellationRequested,
    /// The configured time budget ran out.
    DeadlineExceeded,
}

impl EngineError {
    pub fn malformed(reason: impl Into<String>, direction: Direction) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
            direction,
        }
    }

    pub fn incompatible(reason: impl Into<String>) -> Self {
        Self::IncompatibleCombine {
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    pub fn analysis(block: impl Into<BlockId>, reason: impl Into<String>) -> Self {
        Self::AnalysisFailure {
            block: block.into(),
            reason: reason.into(),
        }
    }

    /// Errors that only invalidate the triggering message, not the worker.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. } | Self::ProtocolViolation { .. }
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage { reason, direction } => {
                write!(f, "malformed {} message: {}", direction, reason)
            }
            Self::IncompatibleCombine { reason } => {
                write!(f, "incompatible combine: {}", reason)
            }
            Self::ProtocolViolation { reason } => write!(f, "protocol violation: {}", reason),
            Self::AnalysisFailure { block, reason } => {
                write!(f, "analysis failure in block '{}': {}", block, reason)
            }
            Self::CancellationRequested => write!(f, "cancellation requested"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for EngineError {}
