//! Run-wide aggregation of diagnostics into a verdict

use crate::core::{Diagnostic, DocumentError, ExcludedDocument, Location, RuleCategory, Severity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Diagnostic totals by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub errors: usize,
    pub warnings: usize,
}

/// A document that was listed but not evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// The result of one evaluation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Documents that were modelled and evaluated, by path
    pub documents: Vec<PathBuf>,
    /// Documents excluded from evaluation, by path
    pub excluded: Vec<ExcludedEntry>,
    /// Every diagnostic of the run, sorted
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Assemble a report; all lists are put in canonical order
    pub fn new(
        mut documents: Vec<PathBuf>,
        mut excluded: Vec<ExcludedEntry>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Self {
        documents.sort();
        excluded.sort_by(|a, b| a.path.cmp(&b.path));
        diagnostics.sort();
        Self {
            documents,
            excluded,
            diagnostics,
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.diagnostics.iter().any(Diagnostic::is_error) {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    pub fn counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for diagnostic in &self.diagnostics {
            match diagnostic.severity {
                Severity::Error => counts.errors += 1,
                Severity::Warning => counts.warnings += 1,
            }
        }
        counts
    }

    /// Diagnostics grouped by file. Run-level diagnostics have no file.
    pub fn by_file(&self) -> BTreeMap<Option<&Path>, Vec<&Diagnostic>> {
        let mut groups: BTreeMap<Option<&Path>, Vec<&Diagnostic>> = BTreeMap::new();
        for diagnostic in &self.diagnostics {
            groups
                .entry(diagnostic.location.file.as_deref())
                .or_default()
                .push(diagnostic);
        }
        groups
    }

    /// Total number of input documents, evaluated or excluded
    pub fn total_documents(&self) -> usize {
        self.documents.len() + self.excluded.len()
    }

    pub fn exit_code(&self) -> i32 {
        match self.verdict() {
            Verdict::Pass => 0,
            Verdict::Fail => 1,
        }
    }
}

/// The diagnostic recorded for a document that could not be evaluated
pub fn exclusion_diagnostic(excluded: &ExcludedDocument) -> Diagnostic {
    let rule_id = match excluded.error {
        DocumentError::Read(_) => "unreadable-document",
        DocumentError::Parse(_) => "parse-error",
        DocumentError::Model(_) => "model-error",
    };
    Diagnostic::new(
        rule_id,
        RuleCategory::Document,
        Severity::Error,
        Location::document(&excluded.path),
        format!("document excluded from evaluation: {}", excluded.error),
    )
}

impl From<&ExcludedDocument> for ExcludedEntry {
    fn from(excluded: &ExcludedDocument) -> Self {
        Self {
            path: excluded.path.clone(),
            reason: excluded.error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, LoadedDocument, ModelError};

    fn diagnostic(file: &str, severity: Severity) -> Diagnostic {
        Diagnostic::new(
            "descriptive-name",
            RuleCategory::Structural,
            severity,
            Location::document(Path::new(file)),
            "name too short",
        )
    }

    #[test]
    fn test_empty_report_passes() {
        let report = RunReport::new(vec![PathBuf::from("ci.yml")], Vec::new(), Vec::new());
        assert_eq!(report.verdict(), Verdict::Pass);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.counts(), SeverityCounts::default());
    }

    #[test]
    fn test_warnings_alone_pass() {
        let report = RunReport::new(
            vec![PathBuf::from("ci.yml")],
            Vec::new(),
            vec![diagnostic("ci.yml", Severity::Warning)],
        );
        assert_eq!(report.verdict(), Verdict::Pass);
        assert_eq!(report.counts().warnings, 1);
    }

    #[test]
    fn test_any_error_fails() {
        let report = RunReport::new(
            vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")],
            Vec::new(),
            vec![
                diagnostic("b.yml", Severity::Warning),
                diagnostic("a.yml", Severity::Error),
            ],
        );
        assert_eq!(report.verdict(), Verdict::Fail);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.diagnostics[0].location.file.as_deref(), Some(Path::new("a.yml")));

        let groups = report.by_file();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&Some(Path::new("b.yml"))].len(), 1);
    }

    #[test]
    fn test_exclusion_diagnostics_by_cause() {
        let LoadedDocument::Excluded(parse) =
            LoadedDocument::from_document(&Document::new("bad.yml", "jobs: [\n"))
        else {
            panic!("expected exclusion");
        };
        assert_eq!(exclusion_diagnostic(&parse).rule_id, "parse-error");

        let model = ExcludedDocument {
            path: PathBuf::from("empty.yml"),
            error: DocumentError::Model(ModelError::NoJobs),
        };
        let diagnostic = exclusion_diagnostic(&model);
        assert_eq!(diagnostic.rule_id, "model-error");
        assert_eq!(diagnostic.category, RuleCategory::Document);
        assert!(diagnostic.is_error());

        let entry = ExcludedEntry::from(&model);
        assert_eq!(entry.path, PathBuf::from("empty.yml"));
    }
}
