//! Trigger rules: required trigger kinds, branch filters and branch guards

use crate::core::{LintPolicy, Location, RuleCategory, Severity, WorkflowModel};
use crate::rules::patterns::compared_branches;
use crate::rules::{contains_keyword, Finding, Rule};

/// Trigger kinds that accept a `branches` filter
const BRANCH_FILTERED: &[&str] = &["push", "pull_request", "pull_request_target", "workflow_run"];

pub fn rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(RequiredTrigger {
            kinds: policy.triggers.required.clone(),
        }),
        Box::new(TriggerBranches {
            kinds: policy.triggers.required.clone(),
            branches: policy.triggers.branches.clone(),
        }),
        Box::new(GuardedCommand {
            commands: policy.guarded_commands.clone(),
            branches: policy.protected_branches.clone(),
        }),
    ]
}

pub struct RequiredTrigger {
    kinds: Vec<String>,
}

impl Rule for RequiredTrigger {
    fn id(&self) -> &'static str {
        "required-trigger"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Trigger
    }

    fn description(&self) -> &'static str {
        "workflow is triggered by every kind the policy requires"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        // A missing trigger field is a structural problem, reported once there
        if !model.triggers.declared {
            return Vec::new();
        }

        self.kinds
            .iter()
            .filter(|kind| !model.triggers.contains(kind))
            .map(|kind| {
                Finding::new(
                    Location::document(&model.path),
                    format!("workflow should trigger on '{}'", kind),
                )
            })
            .collect()
    }
}

/// Required branch-filtering triggers must include every mandated branch
pub struct TriggerBranches {
    kinds: Vec<String>,
    branches: Vec<String>,
}

impl Rule for TriggerBranches {
    fn id(&self) -> &'static str {
        "trigger-branches"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Trigger
    }

    fn description(&self) -> &'static str {
        "required triggers filter on the branches the policy mandates"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        if self.branches.is_empty() {
            return Vec::new();
        }

        let mut findings = Vec::new();
        for kind in self.kinds.iter().filter(|k| BRANCH_FILTERED.contains(&k.as_str())) {
            let Some(config) = model.triggers.get(kind) else {
                continue;
            };

            match &config.branches {
                None => findings.push(Finding::new(
                    Location::document(&model.path),
                    format!(
                        "'{}' trigger should filter branches to include {}",
                        kind,
                        quoted(&self.branches)
                    ),
                )),
                Some(listed) => {
                    for branch in self.branches.iter().filter(|b| !listed.contains(b)) {
                        findings.push(Finding::new(
                            Location::document(&model.path),
                            format!(
                                "'{}' trigger branches {} do not include '{}'",
                                kind,
                                quoted(listed),
                                branch
                            ),
                        ));
                    }
                }
            }
        }
        findings
    }
}

/// Commands such as `terraform apply` may only run behind an `if:` that
/// compares the ref to a protected branch exactly
pub struct GuardedCommand {
    commands: Vec<String>,
    branches: Vec<String>,
}

impl GuardedCommand {
    fn is_guarded(&self, condition: Option<&str>) -> bool {
        condition.is_some_and(|condition| {
            compared_branches(condition)
                .iter()
                .any(|branch| self.branches.contains(branch))
        })
    }
}

impl Rule for GuardedCommand {
    fn id(&self) -> &'static str {
        "guarded-apply"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Trigger
    }

    fn description(&self) -> &'static str {
        "deploying commands only run when the ref is a protected branch"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        if self.commands.is_empty() || self.branches.is_empty() {
            return Vec::new();
        }

        model
            .steps()
            .filter(|(_, step)| {
                step.script()
                    .is_some_and(|script| contains_keyword(script, &self.commands))
            })
            .filter(|(job, step)| {
                !self.is_guarded(step.condition.as_deref()) && !self.is_guarded(job.condition.as_deref())
            })
            .map(|(job, step)| {
                let condition = step
                    .condition_field()
                    .present()
                    .map(|c| format!("condition '{}'", c))
                    .unwrap_or_else(|| "no condition".to_string());
                Finding::new(
                    Location::step(&model.path, &job.name, step.index),
                    format!(
                        "step runs a guarded command with {}; require the ref to equal {}",
                        condition,
                        quoted(&self.branches)
                    ),
                )
            })
            .collect()
    }
}

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("'{}'", item))
        .collect::<Vec<_>>()
        .join(", ")
}
