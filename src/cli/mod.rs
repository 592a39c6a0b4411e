//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, RulesCommand};
use std::ffi::OsString;

/// Static policy linter for CI workflow definitions
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-lint")]
#[command(author = "pipeline-lint contributors")]
#[command(version = "0.1.0")]
#[command(about = "Lint CI workflow definitions against a configurable policy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Lint every workflow file in a directory
    Check(CheckCommand),

    /// List the rules in force
    Rules(RulesCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::OutputFormatArg;
    use crate::execution::SchedulingStrategy;
    use std::path::PathBuf;

    #[test]
    fn test_parse_check_defaults() {
        let cli = Cli::try_parse_from(["pipeline-lint", "check", ".github/workflows"]).unwrap();
        let Command::Check(cmd) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(cmd.dir, PathBuf::from(".github/workflows"));
        assert_eq!(cmd.format, OutputFormatArg::Text);
        assert_eq!(cmd.scheduling(), SchedulingStrategy::Sequential);
        assert!(cmd.policy.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_check_options() {
        let cli = Cli::try_parse_from([
            "pipeline-lint",
            "-v",
            "check",
            "wf",
            "--policy",
            "policy.yml",
            "--format",
            "json",
            "--strategy",
            "parallel-limited",
            "--jobs",
            "8",
        ])
        .unwrap();
        let Command::Check(cmd) = cli.command else {
            panic!("expected check");
        };
        assert!(cli.verbose);
        assert_eq!(cmd.format, OutputFormatArg::Json);
        assert_eq!(cmd.policy, Some(PathBuf::from("policy.yml")));
        assert_eq!(cmd.scheduling(), SchedulingStrategy::LimitedParallel(8));
    }

    #[test]
    fn test_check_requires_directory() {
        assert!(Cli::try_parse_from(["pipeline-lint", "check"]).is_err());
    }

    #[test]
    fn test_parse_rules() {
        let cli = Cli::try_parse_from(["pipeline-lint", "rules", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Rules(RulesCommand { json: true, .. })));
    }
}
