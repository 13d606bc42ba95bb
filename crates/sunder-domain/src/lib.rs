//! # sunder-domain — The "Lens" of SUNDER
//!
//! What a worker sees of an abstract domain: the [`DistributedAnalysis`]
//! capability struct bundling the serialize / deserialize / proceed /
//! combine / widen operators, the coverage predicate, and a handle to the
//! inner block analysis. The engine consumes the capability struct and
//! never looks through it.
//!
//! The crate also ships one complete domain, the interval domain over
//! named integer variables, so the engine is runnable end to end without
//! an external solver.

pub mod interval;
pub mod ops;
pub mod task;

pub use interval::{interval_analysis, CmpOp, Interval, IntervalAnalysis, IntervalState, Stmt};
pub use ops::{
    BlockAnalysis, BlockOutcome, DistributedAnalysis, Precision, ProceedDecision, ViolationHit,
};
pub use task::AnalysisTask;
