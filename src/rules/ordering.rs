//! Ordering rules: anchor steps must precede their phase steps

use crate::core::config::OrderingConstraint;
use crate::core::{Job, LintPolicy, Location, RuleCategory, Step, WorkflowModel};
use crate::rules::{Finding, Rule};

pub fn rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    let constraints: Vec<OrderingConstraint> = policy
        .ordering
        .iter()
        .map(|c| OrderingConstraint {
            anchor: c.anchor.to_lowercase(),
            before: c.before.iter().map(|b| b.to_lowercase()).collect(),
        })
        .collect();

    vec![
        Box::new(AnchorOrder {
            constraints: constraints.clone(),
        }),
        Box::new(AnchorMissing { constraints }),
    ]
}

/// Index of the first step whose name contains the anchor keyword
fn anchor_index(job: &Job, anchor: &str) -> Option<usize> {
    job.steps
        .iter()
        .find(|step| step.name_lower().contains(anchor))
        .map(|step| step.index)
}

/// Steps whose name contains one of the phase keywords, with that keyword.
/// Anchor steps are never phase steps.
fn phase_steps<'a>(job: &'a Job, constraint: &'a OrderingConstraint) -> Vec<(&'a Step, &'a str)> {
    job.steps
        .iter()
        .filter_map(|step| {
            let name = step.name_lower();
            if name.contains(&constraint.anchor) {
                return None;
            }
            constraint
                .before
                .iter()
                .find(|phase| name.contains(phase.as_str()))
                .map(|phase| (step, phase.as_str()))
        })
        .collect()
}

pub struct AnchorOrder {
    constraints: Vec<OrderingConstraint>,
}

impl Rule for AnchorOrder {
    fn id(&self) -> &'static str {
        "anchor-order"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Ordering
    }

    fn description(&self) -> &'static str {
        "anchor steps (e.g. 'terraform init') run before their phase steps"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let mut findings = Vec::new();

        for job in &model.jobs {
            for constraint in &self.constraints {
                let Some(anchor) = anchor_index(job, &constraint.anchor) else {
                    continue;
                };

                for (step, phase) in phase_steps(job, constraint) {
                    if step.index < anchor {
                        findings.push(Finding::new(
                            Location::step(&model.path, &job.name, step.index),
                            format!(
                                "'{}' step at index {} must run after '{}' step at index {}",
                                phase, step.index, constraint.anchor, anchor
                            ),
                        ));
                    }
                }
            }
        }
        findings
    }
}

/// Phase steps present without their anchor
pub struct AnchorMissing {
    constraints: Vec<OrderingConstraint>,
}

impl Rule for AnchorMissing {
    fn id(&self) -> &'static str {
        "anchor-missing"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Ordering
    }

    fn description(&self) -> &'static str {
        "jobs with phase steps also contain the anchor step"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let mut findings = Vec::new();

        for job in &model.jobs {
            for constraint in &self.constraints {
                if anchor_index(job, &constraint.anchor).is_some() {
                    continue;
                }

                let phases = phase_steps(job, constraint);
                if let Some((first, _)) = phases.first() {
                    let indices: Vec<String> = phases.iter().map(|(s, _)| s.index.to_string()).collect();
                    findings.push(Finding::new(
                        Location::job(&model.path, &job.name),
                        format!(
                            "job has steps at indices [{}] that require a '{}' step, but none exists (first at index {})",
                            indices.join(", "),
                            constraint.anchor,
                            first.index
                        ),
                    ));
                }
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::model;

    fn terraform_rules() -> (AnchorOrder, AnchorMissing) {
        let constraints = vec![OrderingConstraint {
            anchor: "terraform init".to_string(),
            before: vec!["terraform validate".to_string(), "terraform plan".to_string()],
        }];
        (
            AnchorOrder {
                constraints: constraints.clone(),
            },
            AnchorMissing { constraints },
        )
    }

    fn job_with_steps(names: &[&str]) -> String {
        let steps: String = names
            .iter()
            .map(|name| format!("      - name: {}\n        run: echo step\n", name))
            .collect();
        format!(
            "name: Terraform deploy\non: push\njobs:\n  terraform:\n    runs-on: ubuntu-latest\n    steps:\n{}",
            steps
        )
    }

    #[test]
    fn test_init_after_plan_is_one_error_citing_both_indices() {
        let (order, missing) = terraform_rules();
        let yaml = job_with_steps(&["Checkout", "Terraform Plan", "Terraform Init"]);
        let model = model(&yaml);

        let findings = order.check(&model);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("index 1"));
        assert!(findings[0].message.contains("index 2"));
        assert_eq!(findings[0].location.step, Some(1));
        assert!(missing.check(&model).is_empty());
    }

    #[test]
    fn test_init_before_plan_is_clean() {
        let (order, missing) = terraform_rules();
        let yaml = job_with_steps(&["Checkout", "Terraform Init", "Format", "Validate", "Terraform Plan"]);
        let model = model(&yaml);

        assert!(order.check(&model).is_empty());
        assert!(missing.check(&model).is_empty());
    }

    #[test]
    fn test_missing_anchor_is_reported_distinctly() {
        let (order, missing) = terraform_rules();
        let yaml = job_with_steps(&["Checkout", "Terraform Validate", "Terraform Plan"]);
        let model = model(&yaml);

        assert!(order.check(&model).is_empty());
        let findings = missing.check(&model);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("[1, 2]"));
        assert_eq!(findings[0].location.step, None);
    }

    #[test]
    fn test_job_without_phases_is_inapplicable() {
        let (order, missing) = terraform_rules();
        let yaml = job_with_steps(&["Checkout", "Build"]);
        let model = model(&yaml);

        assert!(order.check(&model).is_empty());
        assert!(missing.check(&model).is_empty());
    }

    #[test]
    fn test_each_early_phase_is_reported() {
        let (order, _) = terraform_rules();
        let yaml = job_with_steps(&["Terraform Validate", "Terraform Plan", "Terraform Init"]);
        assert_eq!(order.check(&model(&yaml)).len(), 2);
    }

    #[test]
    fn test_policy_keywords_are_case_insensitive() {
        let policy = LintPolicy::default();
        let registered = rules(&policy);
        let yaml = job_with_steps(&["TERRAFORM PLAN", "terraform init"]);
        let findings = registered[0].check(&model(&yaml));
        assert_eq!(findings.len(), 1);
    }
}
