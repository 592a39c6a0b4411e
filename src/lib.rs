//! pipeline-lint - static policy checks for CI workflow definitions

pub mod cli;
pub mod core;
pub mod execution;
pub mod rules;

// Re-export commonly used types
pub use crate::core::{Diagnostic, LintPolicy, Location, RuleCategory, Severity, WorkflowModel};
pub use crate::execution::{EvaluationEngine, EvaluationEvent, RunContext, RunReport, SchedulingStrategy, Verdict};
pub use crate::rules::{Rule, RuleRegistry};
