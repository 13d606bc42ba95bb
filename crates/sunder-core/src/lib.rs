//! # sunder-core — The "Skeleton" of SUNDER
//!
//! Pure data atoms of the distributed block-summary engine: the block
//! graph handed to the orchestrator, the message envelope exchanged
//! between workers, the global verdict cell, and the error taxonomy.
//!
//! Nothing in this crate knows about abstract domains, tokio tasks, or
//! routing. It is the vocabulary every other crate speaks.

pub mod block;
pub mod error;
pub mod message;
pub mod verdict;

pub use block::{BlockGraph, BlockId, BlockNode, NodeId};
pub use error::EngineError;
pub use message::{Direction, Message, MessageKind, Payload};
pub use verdict::{Verdict, VerdictCell};
