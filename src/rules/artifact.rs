//! Resource/artifact rules

use crate::core::{Field, LintPolicy, Location, RuleCategory, WorkflowModel};
use crate::rules::{Finding, Rule};

pub fn rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    vec![Box::new(ArtifactMetadata {
        actions: policy.artifact_actions.iter().map(|a| a.to_lowercase()).collect(),
    })]
}

/// Steps publishing an artifact must name it and say where it lives
pub struct ArtifactMetadata {
    actions: Vec<String>,
}

impl ArtifactMetadata {
    fn publishes(&self, uses: &str) -> bool {
        let action = uses.split('@').next().unwrap_or_default().to_lowercase();
        self.actions.iter().any(|a| action == *a)
    }
}

impl Rule for ArtifactMetadata {
    fn id(&self) -> &'static str {
        "artifact-metadata"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Artifact
    }

    fn description(&self) -> &'static str {
        "published artifacts declare both a name and a path"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (job, step) in model.steps() {
            let Some(uses) = step.uses() else { continue };
            if !self.publishes(uses) {
                continue;
            }

            for param in ["name", "path"] {
                let problem = match step.with_param(param) {
                    Field::Present(_) => continue,
                    Field::Empty => "is empty",
                    Field::Absent => "is missing",
                };
                findings.push(Finding::new(
                    Location::step(&model.path, &job.name, step.index),
                    format!("artifact published by '{}': 'with.{}' {}", uses, param, problem),
                ));
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::model;

    fn rule() -> ArtifactMetadata {
        ArtifactMetadata {
            actions: vec!["actions/upload-artifact".to_string()],
        }
    }

    fn workflow(step: &str) -> String {
        format!(
            "name: Security scan\non: push\njobs:\n  scan:\n    runs-on: ubuntu-latest\n    steps:\n{}",
            step
        )
    }

    #[test]
    fn test_named_artifact_with_path() {
        let yaml = workflow(
            "      - uses: actions/upload-artifact@v4\n        with:\n          name: zap-report\n          path: report_html.html\n",
        );
        assert!(rule().check(&model(&yaml)).is_empty());
    }

    #[test]
    fn test_missing_path_and_empty_name() {
        let yaml = workflow("      - uses: actions/upload-artifact@v4\n        with:\n          name: \"\"\n");
        let findings = rule().check(&model(&yaml));
        assert_eq!(findings.len(), 2);
        assert!(findings[0].message.contains("'with.name' is empty"));
        assert!(findings[1].message.contains("'with.path' is missing"));
    }

    #[test]
    fn test_no_with_block() {
        let yaml = workflow("      - uses: actions/upload-artifact@v4\n");
        assert_eq!(rule().check(&model(&yaml)).len(), 2);
    }

    #[test]
    fn test_other_actions_are_inapplicable() {
        let yaml = workflow("      - uses: actions/download-artifact@v4\n      - run: echo hi\n");
        assert!(rule().check(&model(&yaml)).is_empty());
    }
}
