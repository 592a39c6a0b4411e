//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Concurrency used by `parallel-limited` when `--jobs` is not given
const DEFAULT_JOBS: usize = 4;

/// Lint a directory of workflow files
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    /// Directory containing the workflow files
    pub dir: PathBuf,

    /// Policy file (YAML); built-in defaults when omitted
    #[arg(short, long)]
    pub policy: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
    pub format: OutputFormatArg,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum documents in flight for parallel-limited
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl CheckCommand {
    pub fn scheduling(&self) -> SchedulingStrategy {
        match (self.strategy, self.jobs) {
            (SchedulingStrategyArg::ParallelLimited, Some(jobs)) => SchedulingStrategy::LimitedParallel(jobs.max(1)),
            (strategy, _) => strategy.into(),
        }
    }
}

/// List the rule catalog
#[derive(Debug, Args, Clone)]
pub struct RulesCommand {
    /// Policy file whose overrides should be applied
    #[arg(short, long)]
    pub policy: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Report format argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormatArg {
    Text,
    Json,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(DEFAULT_JOBS),
        }
    }
}
