//! Rule evaluation over a set of loaded documents

pub mod engine;
pub mod report;

pub use engine::{EngineError, EvaluationEngine, EvaluationEvent, EventHandler, RunContext, SchedulingStrategy};
pub use report::{ExcludedEntry, RunReport, SeverityCounts, Verdict};
