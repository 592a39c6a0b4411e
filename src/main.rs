use anyhow::{Context, Result};
use pipeline_lint::cli::commands::{CheckCommand, OutputFormatArg, RulesCommand};
use pipeline_lint::cli::output::*;
use pipeline_lint::cli::{Cli, Command};
use pipeline_lint::execution::{EvaluationEngine, RunContext};
use pipeline_lint::{LintPolicy, RuleRegistry};
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status for input that could not be evaluated at all
const EXIT_UNRECOVERABLE: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let outcome = match &cli.command {
        Command::Check(cmd) => check(cmd).await,
        Command::Rules(cmd) => list_rules(cmd),
    };

    match outcome {
        Ok(code) => {
            std::io::stdout().flush().context("Failed to flush report")?;
            std::process::exit(code)
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            std::process::exit(EXIT_UNRECOVERABLE);
        }
    }
}

fn load_policy(path: Option<&Path>) -> Result<LintPolicy> {
    match path {
        Some(path) => {
            debug!("Loading policy from {}", path.display());
            LintPolicy::from_file(path).with_context(|| format!("Failed to load policy {}", path.display()))
        }
        None => Ok(LintPolicy::default()),
    }
}

async fn check(cmd: &CheckCommand) -> Result<i32> {
    let policy = load_policy(cmd.policy.as_deref())?;

    let ctx = RunContext::load(&cmd.dir, &policy)
        .await
        .with_context(|| format!("Failed to load workflows from {}", cmd.dir.display()))?;

    let mut engine = EvaluationEngine::new(cmd.scheduling());

    // Progress only accompanies the human-readable report
    let progress = (cmd.format == OutputFormatArg::Text).then(|| create_progress_bar(ctx.documents.len()));
    if let Some(progress) = progress.clone() {
        engine.add_event_handler(move |event| track_progress(&progress, &event));
    }

    let report = engine.evaluate(&ctx).await.context("Evaluation failed")?;

    match cmd.format {
        OutputFormatArg::Text => print!("{}", render_text(&report)),
        OutputFormatArg::Json => println!("{}", render_json(&report)?),
    }

    Ok(report.exit_code())
}

fn list_rules(cmd: &RulesCommand) -> Result<i32> {
    let policy = load_policy(cmd.policy.as_deref())?;
    let registry = RuleRegistry::from_policy(&policy);
    let rules = registry.describe();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
    } else {
        println!("{} {} rules in force", INFO, style(rules.len()).cyan());
        print!("{}", render_rules(&rules));
    }
    Ok(0)
}
