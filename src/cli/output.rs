//! CLI output formatting

use crate::core::{Diagnostic, Location, Severity};
use crate::execution::{EvaluationEvent, ExcludedEntry, RunReport, SeverityCounts, Verdict};
use crate::rules::RuleInfo;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");

/// Create a progress bar on stderr; hidden when stderr is not a terminal
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) =
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Advance a progress bar from engine events
pub fn track_progress(progress: &ProgressBar, event: &EvaluationEvent) {
    match event {
        EvaluationEvent::DocumentEvaluated { path, .. } => {
            progress.set_message(
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            progress.inc(1);
        }
        EvaluationEvent::RunCompleted { .. } => progress.finish_and_clear(),
    }
}

pub fn format_severity(severity: Severity) -> String {
    match severity {
        Severity::Error => style("error").red().bold().to_string(),
        Severity::Warning => style("warning").yellow().to_string(),
    }
}

/// Location inside the file, without the file itself
fn format_position(location: &Location) -> String {
    let inner = Location {
        file: None,
        ..location.clone()
    };
    if inner == Location::default() {
        "document".to_string()
    } else {
        inner.to_string()
    }
}

/// Format one diagnostic as a line under its file heading
pub fn format_diagnostic(diagnostic: &Diagnostic) -> String {
    let icon = match diagnostic.severity {
        Severity::Error => CROSS,
        Severity::Warning => WARN,
    };
    format!(
        "  {}{} {} {}: {}",
        icon,
        format_severity(diagnostic.severity),
        style(format!("[{}]", diagnostic.rule_id)).dim(),
        style(format_position(&diagnostic.location)).cyan(),
        diagnostic.message
    )
}

/// Human-readable report, grouped by file
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();

    for (file, diagnostics) in report.by_file() {
        let heading = file
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(run)".to_string());
        let _ = writeln!(out, "{}", style(heading).bold());
        for diagnostic in diagnostics {
            let _ = writeln!(out, "{}", format_diagnostic(diagnostic));
        }
        out.push('\n');
    }

    let counts = report.counts();
    let _ = writeln!(
        out,
        "{} {} documents checked ({} excluded): {} errors, {} warnings",
        INFO,
        report.total_documents(),
        report.excluded.len(),
        style(counts.errors).red(),
        style(counts.warnings).yellow()
    );

    match report.verdict() {
        Verdict::Pass => {
            let _ = writeln!(out, "{} {}", CHECK, style(Verdict::Pass).green().bold());
        }
        Verdict::Fail => {
            let _ = writeln!(out, "{} {}", CROSS, style(Verdict::Fail).red().bold());
        }
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    verdict: Verdict,
    counts: SeverityCounts,
    documents: &'a [PathBuf],
    excluded: &'a [ExcludedEntry],
    diagnostics: &'a [Diagnostic],
}

/// Machine-readable report. Identical inputs give byte-identical output.
pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        verdict: report.verdict(),
        counts: report.counts(),
        documents: &report.documents,
        excluded: &report.excluded,
        diagnostics: &report.diagnostics,
    })
}

/// Rule catalog as a table
pub fn render_rules(rules: &[RuleInfo]) -> String {
    let width = rules.iter().map(|rule| rule.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for rule in rules {
        let _ = writeln!(
            out,
            "{:<12} {:<width$}  {:<8} {}",
            rule.category.to_string(),
            rule.id,
            rule.severity.to_string(),
            style(rule.description).dim(),
            width = width
        );
    }
    out
}
