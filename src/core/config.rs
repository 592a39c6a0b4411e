//! Lint policy configuration from YAML
//!
//! Every threshold, keyword list and severity the rules consult lives here.
//! All fields have defaults, so an empty policy file is valid.

use crate::core::diagnostic::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Error loading a policy file
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Read(#[from] std::io::Error),

    #[error("invalid policy file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Top-level policy loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintPolicy {
    /// File extensions treated as workflow documents
    pub extensions: Vec<String>,

    /// Workflow names must be strictly longer than this
    pub min_name_length: usize,

    /// Top-level `env` names every workflow must define
    pub required_env: Vec<String>,

    /// Steps every workflow must contain
    pub required_steps: Vec<RequiredStep>,

    pub triggers: TriggerPolicy,

    /// Commands that must only run behind a protected-branch condition
    pub guarded_commands: Vec<String>,

    /// Branches accepted by the protected-branch condition
    pub protected_branches: Vec<String>,

    /// Action refs that move over time and therefore do not pin a version
    pub floating_refs: Vec<String>,

    /// Raw-text markers of the platform-provided ephemeral token
    pub ephemeral_token_markers: Vec<String>,

    pub ordering: Vec<OrderingConstraint>,

    /// Actions that publish a named artifact
    pub artifact_actions: Vec<String>,

    /// Step-name keywords identifying health/readiness checks
    pub health_check_names: Vec<String>,

    /// Step-name keywords identifying steps that produce an output value
    pub output_step_names: Vec<String>,

    /// Environment variable used for inter-step value passing
    pub output_sink: String,

    /// Rule ids to skip entirely
    pub disabled_rules: Vec<String>,

    /// Rule id -> severity replacing the rule's default
    pub severity_overrides: BTreeMap<String, Severity>,
}

/// Trigger requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerPolicy {
    /// Trigger kinds that must be present
    pub required: Vec<String>,

    /// Branches every required branch-filtering trigger must include
    pub branches: Vec<String>,
}

/// A step that must exist somewhere in the workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredStep {
    /// Case-insensitive keyword matched against step name, `uses` and `run`
    pub pattern: String,

    /// Human-readable description used in the message
    #[serde(default)]
    pub description: Option<String>,
}

/// An anchor step that must come before the given phase steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderingConstraint {
    /// Step-name keyword of the anchor step
    pub anchor: String,

    /// Step-name keywords of steps that must follow the anchor
    pub before: Vec<String>,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            required: vec!["push".to_string()],
            branches: Vec::new(),
        }
    }
}

impl Default for LintPolicy {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            extensions: strings(&["yml", "yaml"]),
            min_name_length: 5,
            required_env: Vec::new(),
            required_steps: Vec::new(),
            triggers: TriggerPolicy::default(),
            guarded_commands: strings(&["terraform apply"]),
            protected_branches: strings(&["main"]),
            floating_refs: strings(&["main", "master", "latest", "head", "develop", "dev", "trunk"]),
            ephemeral_token_markers: strings(&["github.token", "github_token"]),
            ordering: vec![OrderingConstraint {
                anchor: "terraform init".to_string(),
                before: strings(&["terraform validate", "terraform plan", "terraform apply"]),
            }],
            artifact_actions: strings(&["actions/upload-artifact"]),
            health_check_names: strings(&["healthy", "health check", "health-check", "readiness"]),
            output_step_names: strings(&["load balancer url"]),
            output_sink: "GITHUB_OUTPUT".to_string(),
            disabled_rules: Vec::new(),
            severity_overrides: BTreeMap::new(),
        }
    }
}

impl LintPolicy {
    /// Load a policy from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a policy from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        // An empty file deserializes to null rather than an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let policy: LintPolicy = serde_yaml::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.extensions.is_empty() {
            return Err(PolicyError::Invalid(
                "at least one document extension is required".to_string(),
            ));
        }

        if self.output_sink.trim().is_empty() {
            return Err(PolicyError::Invalid("output_sink must not be empty".to_string()));
        }

        for constraint in &self.ordering {
            if constraint.anchor.trim().is_empty() {
                return Err(PolicyError::Invalid(
                    "ordering anchor must not be empty".to_string(),
                ));
            }
            if constraint.before.iter().any(|b| b.eq_ignore_ascii_case(&constraint.anchor)) {
                return Err(PolicyError::Invalid(format!(
                    "ordering anchor '{}' cannot also be one of its phases",
                    constraint.anchor
                )));
            }
        }

        if let Some(step) = self.required_steps.iter().find(|s| s.pattern.trim().is_empty()) {
            return Err(PolicyError::Invalid(format!(
                "required step pattern must not be empty (description: {})",
                step.description.as_deref().unwrap_or("none")
            )));
        }

        Ok(())
    }

    pub fn is_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.iter().any(|id| id == rule_id)
    }

    /// Severity for a rule, honouring overrides
    pub fn severity_for(&self, rule_id: &str, default: Severity) -> Severity {
        self.severity_overrides.get(rule_id).copied().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_policy_is_default() {
        assert_eq!(LintPolicy::from_yaml("").unwrap(), LintPolicy::default());
        assert_eq!(LintPolicy::from_yaml("{}").unwrap(), LintPolicy::default());
    }

    #[test]
    fn test_partial_policy_keeps_other_defaults() {
        let yaml = r#"
min_name_length: 10
triggers:
  branches: [main]
required_env: [AWS_REGION, TF_LOG]
severity_overrides:
  pinned-action: warning
disabled_rules: [runs-on-present]
"#;

        let policy = LintPolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.min_name_length, 10);
        assert_eq!(policy.triggers.required, vec!["push".to_string()]);
        assert_eq!(policy.triggers.branches, vec!["main".to_string()]);
        assert_eq!(policy.required_env.len(), 2);
        assert_eq!(policy.output_sink, "GITHUB_OUTPUT");
        assert_eq!(policy.severity_for("pinned-action", Severity::Error), Severity::Warning);
        assert_eq!(policy.severity_for("anchor-order", Severity::Error), Severity::Error);
        assert!(policy.is_disabled("runs-on-present"));
    }

    #[test]
    fn test_unknown_policy_key_fails() {
        assert!(matches!(
            LintPolicy::from_yaml("min_name_lenght: 3\n"),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn test_anchor_listed_as_own_phase_fails() {
        let yaml = r#"
ordering:
  - anchor: "terraform init"
    before: ["Terraform Init"]
"#;
        assert!(matches!(LintPolicy::from_yaml(yaml), Err(PolicyError::Invalid(_))));
    }

    #[test]
    fn test_required_steps_parse() {
        let yaml = r#"
required_steps:
  - pattern: checkout
  - pattern: tfsec
    description: "security scanning"
"#;
        let policy = LintPolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.required_steps.len(), 2);
        assert_eq!(policy.required_steps[1].description.as_deref(), Some("security scanning"));
    }
}
