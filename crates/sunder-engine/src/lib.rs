//! # sunder-engine — The "Engine" of SUNDER
//!
//! The distributed block-summary machinery: one async worker per block,
//! coalescing mailboxes, outstanding-message quiescence tracking, and
//! the orchestrator that routes summaries, owns the verdict, and issues
//! cooperative cancellation.
//!
//! The engine is generic over the abstract domain; it only speaks
//! through the [`sunder_domain::DistributedAnalysis`] capability struct.

pub mod config;
pub mod diagnostics;
pub mod mailbox;
pub mod orchestrator;
pub mod quiescence;
pub mod worker;

pub use config::EngineConfig;
pub use diagnostics::{Action, ActionRecord, DiagnosticsSink, MemorySink, NullSink, TracingSink};
pub use orchestrator::{run_analysis, AnalysisOutcome, EngineStats};
pub use worker::{Worker, WorkerEvent, WorkerStats};
