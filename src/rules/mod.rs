//! Rule trait and registry
//!
//! Rules are pure predicates over an immutable [`WorkflowModel`]. They are
//! built once from the [`LintPolicy`] in force, own whatever configuration
//! they need, and hold no state between runs.

pub mod artifact;
pub mod ordering;
pub mod patterns;
pub mod script;
pub mod security;
pub mod structural;
pub mod trigger;

use crate::core::{Diagnostic, LintPolicy, Location, RuleCategory, Severity, WorkflowModel};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A named predicate over a workflow model
pub trait Rule: Send + Sync {
    /// Stable identifier, used in diagnostics and policy overrides
    fn id(&self) -> &'static str;

    fn category(&self) -> RuleCategory;

    /// One-line description for rule listings
    fn description(&self) -> &'static str;

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    /// Check a single document.
    ///
    /// Must not panic on unexpected shapes: a rule whose preconditions are
    /// not met returns no findings.
    fn check(&self, model: &WorkflowModel) -> Vec<Finding>;

    /// Check the full set of documents of a run
    fn check_all(&self, _models: &[Arc<WorkflowModel>]) -> Vec<Finding> {
        Vec::new()
    }
}

/// A rule violation before the registry attaches rule id and severity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub location: Location,
    pub message: String,
}

impl Finding {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

/// A registered rule together with its effective severity
pub struct RegisteredRule {
    rule: Box<dyn Rule>,
    severity: Severity,
}

impl RegisteredRule {
    pub fn id(&self) -> &'static str {
        self.rule.id()
    }

    pub fn category(&self) -> RuleCategory {
        self.rule.category()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description(&self) -> &'static str {
        self.rule.description()
    }

    fn diagnostics(&self, findings: Vec<Finding>) -> Vec<Diagnostic> {
        findings
            .into_iter()
            .map(|finding| {
                Diagnostic::new(
                    self.rule.id(),
                    self.rule.category(),
                    self.severity,
                    finding.location,
                    finding.message,
                )
            })
            .collect()
    }

    /// Run the rule over one document
    pub fn evaluate(&self, model: &WorkflowModel) -> Vec<Diagnostic> {
        self.diagnostics(self.rule.check(model))
    }

    /// Run the cross-document part of the rule
    pub fn evaluate_all(&self, models: &[Arc<WorkflowModel>]) -> Vec<Diagnostic> {
        self.diagnostics(self.rule.check_all(models))
    }
}

/// Summary of a registered rule, for listings
#[derive(Debug, Clone, Serialize)]
pub struct RuleInfo {
    pub id: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
    pub description: &'static str,
}

/// The catalog of rules in force for a run
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<RegisteredRule>,
}

impl RuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full built-in catalog configured by `policy`
    pub fn from_policy(policy: &LintPolicy) -> Self {
        let mut registry = Self::new();

        for rule in builtin_rules(policy) {
            if policy.is_disabled(rule.id()) {
                debug!("Rule '{}' disabled by policy", rule.id());
                continue;
            }
            let severity = policy.severity_for(rule.id(), rule.default_severity());
            registry.register_with_severity(rule, severity);
        }

        debug!("Registered {} rules", registry.len());
        registry
    }

    /// Register a rule at its default severity
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        let severity = rule.default_severity();
        self.register_with_severity(rule, severity);
    }

    pub fn register_with_severity(&mut self, rule: Box<dyn Rule>, severity: Severity) {
        self.rules.push(RegisteredRule { rule, severity });
    }

    pub fn rules(&self) -> &[RegisteredRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredRule> {
        self.rules.iter().find(|rule| rule.id() == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules of one category
    pub fn in_category(&self, category: RuleCategory) -> impl Iterator<Item = &RegisteredRule> {
        self.rules.iter().filter(move |rule| rule.category() == category)
    }

    /// Listing of every registered rule, sorted by category then id
    pub fn describe(&self) -> Vec<RuleInfo> {
        let mut infos: Vec<_> = self
            .rules
            .iter()
            .map(|rule| RuleInfo {
                id: rule.id(),
                category: rule.category(),
                severity: rule.severity(),
                description: rule.description(),
            })
            .collect();
        infos.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(b.id)));
        infos
    }

    /// Apply every rule to one document
    pub fn evaluate(&self, model: &WorkflowModel) -> Vec<Diagnostic> {
        self.rules.iter().flat_map(|rule| rule.evaluate(model)).collect()
    }
}

fn builtin_rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    let mut rules = Vec::new();
    rules.extend(structural::rules(policy));
    rules.extend(trigger::rules(policy));
    rules.extend(security::rules(policy));
    rules.extend(ordering::rules(policy));
    rules.extend(artifact::rules(policy));
    rules.extend(script::rules(policy));
    rules
}

/// Case-insensitive keyword containment
pub(crate) fn contains_keyword(haystack: &str, keywords: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    keywords
        .iter()
        .any(|keyword| haystack.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::{Document, WorkflowModel};

    /// Build a model from inline YAML
    pub fn model(yaml: &str) -> WorkflowModel {
        Document::new("test.yml", yaml)
            .to_model()
            .expect("fixture should build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_rule_ids_are_unique() {
        let registry = RuleRegistry::from_policy(&LintPolicy::default());
        let ids: HashSet<_> = registry.rules().iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), registry.len());
    }

    #[test]
    fn test_every_category_is_registered() {
        let registry = RuleRegistry::from_policy(&LintPolicy::default());
        for category in [
            RuleCategory::Structural,
            RuleCategory::Trigger,
            RuleCategory::Security,
            RuleCategory::Ordering,
            RuleCategory::Artifact,
            RuleCategory::Script,
        ] {
            assert!(
                registry.in_category(category).count() > 0,
                "no rules registered for {}",
                category
            );
        }
    }

    #[test]
    fn test_disabled_rule_is_not_registered() {
        let policy = LintPolicy {
            disabled_rules: vec!["pinned-action".to_string()],
            ..LintPolicy::default()
        };
        let registry = RuleRegistry::from_policy(&policy);
        assert!(registry.get("pinned-action").is_none());
        assert!(registry.get("hardcoded-credential").is_some());
    }

    #[test]
    fn test_severity_override_applies() {
        let mut policy = LintPolicy::default();
        policy
            .severity_overrides
            .insert("descriptive-name".to_string(), Severity::Warning);
        let registry = RuleRegistry::from_policy(&policy);

        let model = test_support::model(
            "name: CI\non: push\njobs:\n  a:\n    runs-on: x\n    steps: [{run: make}]\n",
        );
        let diagnostics = registry.get("descriptive-name").unwrap().evaluate(&model);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_contains_keyword_ignores_case() {
        let keywords = vec!["Terraform Init".to_string()];
        assert!(contains_keyword("run TERRAFORM init now", &keywords));
        assert!(!contains_keyword("terraform plan", &keywords));
    }
}
