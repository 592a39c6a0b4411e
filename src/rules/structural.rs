//! Structural rules: document shape

use crate::core::config::RequiredStep;
use crate::core::{LintPolicy, Location, RuleCategory, RunsOn, Severity, StepKind, WorkflowModel};
use crate::rules::{contains_keyword, Finding, Rule};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(RequiredFields),
        Box::new(DescriptiveName {
            min_length: policy.min_name_length,
        }),
        Box::new(JobHasSteps),
        Box::new(StepVariant),
        Box::new(RunsOnPresent),
        Box::new(RequiredEnv {
            names: policy.required_env.clone(),
        }),
        Box::new(RequiredSteps {
            steps: policy.required_steps.clone(),
        }),
        Box::new(DuplicateWorkflowName),
    ]
}

/// The trigger field must be present (`name` and `jobs` are enforced by the
/// model builder)
pub struct RequiredFields;

impl Rule for RequiredFields {
    fn id(&self) -> &'static str {
        "required-fields"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "workflow declares its trigger field ('on')"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        if model.triggers.declared {
            return Vec::new();
        }
        vec![Finding::new(
            Location::document(&model.path),
            "workflow must have an 'on' trigger field",
        )]
    }
}

/// Reject placeholder workflow names
pub struct DescriptiveName {
    min_length: usize,
}

impl Rule for DescriptiveName {
    fn id(&self) -> &'static str {
        "descriptive-name"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "workflow name is long enough to be descriptive"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let length = model.name.trim().chars().count();
        if length > self.min_length {
            return Vec::new();
        }
        vec![Finding::new(
            Location::document(&model.path),
            format!(
                "workflow name '{}' should be descriptive (more than {} characters)",
                model.name, self.min_length
            ),
        )]
    }
}

pub struct JobHasSteps;

impl Rule for JobHasSteps {
    fn id(&self) -> &'static str {
        "job-has-steps"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "every job defines at least one step"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        model
            .jobs
            .iter()
            .filter(|job| job.steps.is_empty() && !job.is_reusable_call())
            .map(|job| {
                Finding::new(
                    Location::job(&model.path, &job.name),
                    format!("job '{}' must define at least one step", job.name),
                )
            })
            .collect()
    }
}

/// Report steps the builder could only keep as invalid placeholders
pub struct StepVariant;

impl Rule for StepVariant {
    fn id(&self) -> &'static str {
        "step-variant"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "every step is exactly one of 'uses' or 'run'"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        model
            .steps()
            .filter_map(|(job, step)| match &step.kind {
                StepKind::Invalid { reason } => Some(Finding::new(
                    Location::step(&model.path, &job.name, step.index),
                    format!("invalid step: {}", reason),
                )),
                _ => None,
            })
            .collect()
    }
}

pub struct RunsOnPresent;

impl Rule for RunsOnPresent {
    fn id(&self) -> &'static str {
        "runs-on-present"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "every job selects a runner with 'runs-on'"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        model
            .jobs
            .iter()
            .filter(|job| job.runs_on == RunsOn::Absent && !job.is_reusable_call())
            .map(|job| {
                Finding::new(
                    Location::job(&model.path, &job.name),
                    format!("job '{}' does not declare 'runs-on'", job.name),
                )
            })
            .collect()
    }
}

pub struct RequiredEnv {
    names: Vec<String>,
}

impl Rule for RequiredEnv {
    fn id(&self) -> &'static str {
        "required-env"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "workflow-level env defines the variables the policy requires"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        self.names
            .iter()
            .filter(|name| !model.env.contains_key(name.as_str()))
            .map(|name| {
                Finding::new(
                    Location::document(&model.path),
                    format!("workflow env must define '{}'", name),
                )
            })
            .collect()
    }
}

pub struct RequiredSteps {
    steps: Vec<RequiredStep>,
}

impl Rule for RequiredSteps {
    fn id(&self) -> &'static str {
        "required-step"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "workflow contains every step the policy requires"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        self.steps
            .iter()
            .filter(|required| {
                let keyword = [required.pattern.clone()];
                !model.steps().any(|(_, step)| {
                    [step.name.as_deref(), step.uses(), step.script()]
                        .into_iter()
                        .flatten()
                        .any(|text| contains_keyword(text, &keyword))
                })
            })
            .map(|required| {
                let what = required.description.as_deref().unwrap_or(&required.pattern);
                Finding::new(
                    Location::document(&model.path),
                    format!("workflow should include a step for {} ('{}')", what, required.pattern),
                )
            })
            .collect()
    }
}

/// Two documents of one run sharing a workflow name
pub struct DuplicateWorkflowName;

impl Rule for DuplicateWorkflowName {
    fn id(&self) -> &'static str {
        "duplicate-workflow-name"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Structural
    }

    fn description(&self) -> &'static str {
        "workflow names are unique across the documents of a run"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, _model: &WorkflowModel) -> Vec<Finding> {
        Vec::new()
    }

    fn check_all(&self, models: &[Arc<WorkflowModel>]) -> Vec<Finding> {
        let mut by_name: BTreeMap<&str, Vec<&WorkflowModel>> = BTreeMap::new();
        for model in models {
            let name = model.name.trim();
            if !name.is_empty() {
                by_name.entry(name).or_default().push(model);
            }
        }

        let mut findings = Vec::new();
        for (name, mut group) in by_name.into_iter().filter(|(_, g)| g.len() > 1) {
            group.sort_by(|a, b| a.path.cmp(&b.path));
            let first = &group[0].path;
            for duplicate in &group[1..] {
                findings.push(Finding::new(
                    Location::document(&duplicate.path),
                    format!(
                        "workflow name '{}' is also used by {}",
                        name,
                        first.display()
                    ),
                ));
            }
        }
        findings
    }
}
