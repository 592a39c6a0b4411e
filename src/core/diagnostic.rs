//! Diagnostic domain model

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// How serious a rule violation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported, but never fails the verdict
    Warning,
    /// Fails the verdict
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCategory {
    /// Document shape: required fields, names, step variants
    Structural,
    /// Trigger kinds and branch filters
    Trigger,
    /// Pinning, credentials, token permissions
    Security,
    /// Step ordering around anchor steps
    Ordering,
    /// Published reports and artifacts
    Artifact,
    /// Embedded shell scripts
    Script,
    /// Documents that could not be loaded or modelled
    Document,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleCategory::Structural => "structural",
            RuleCategory::Trigger => "trigger",
            RuleCategory::Security => "security",
            RuleCategory::Ordering => "ordering",
            RuleCategory::Artifact => "artifact",
            RuleCategory::Script => "script",
            RuleCategory::Document => "document",
        };
        write!(f, "{}", name)
    }
}

/// Where a diagnostic points. Every part is optional; the coarsest
/// available location is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,

    /// Zero-based index of the step within its job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

impl Location {
    /// Location covering a whole document
    pub fn document(file: &Path) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            job: None,
            step: None,
        }
    }

    /// Location covering one job
    pub fn job(file: &Path, job: &str) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            job: Some(job.to_string()),
            step: None,
        }
    }

    /// Location of a single step
    pub fn step(file: &Path, job: &str, index: usize) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            job: Some(job.to_string()),
            step: Some(index),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(file) = &self.file {
            parts.push(file.display().to_string());
        }
        if let Some(job) = &self.job {
            parts.push(format!("jobs.{}", job));
        }
        if let Some(step) = self.step {
            parts.push(format!("steps[{}]", step));
        }
        if parts.is_empty() {
            write!(f, "<run>")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// One reported rule violation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule_id: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        rule_id: impl Into<String>,
        category: RuleCategory,
        severity: Severity,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category,
            severity,
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Key used to order the run-wide diagnostic list
    fn sort_key(&self) -> (&Location, &str, &str) {
        (&self.location, &self.rule_id, &self.message)
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.severity.cmp(&other.severity))
            .then_with(|| self.category.cmp(&other.category))
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.rule_id, self.location, self.message
        )
    }
}
