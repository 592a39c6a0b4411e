//! Embedded-script rules
//!
//! These are pattern-level checks over `run:` bodies. Scripts are never
//! executed or analysed for dataflow.

use crate::core::model::collect_scalars;
use crate::core::{Job, LintPolicy, Location, RuleCategory, Step, WorkflowModel};
use crate::rules::patterns::{has_bounded_wait, referenced_step_outputs, FAILURE_EXIT, SUCCESS_EXIT};
use crate::rules::{contains_keyword, Finding, Rule};
use std::collections::BTreeSet;

pub fn rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(HealthCheckBounded {
            names: policy.health_check_names.clone(),
        }),
        Box::new(HealthCheckExits {
            names: policy.health_check_names.clone(),
        }),
        Box::new(OutputSink {
            names: policy.output_step_names.clone(),
            sink: policy.output_sink.clone(),
        }),
    ]
}

/// Command steps whose name marks them as health/readiness checks
fn health_checks<'a>(
    model: &'a WorkflowModel,
    names: &'a [String],
) -> impl Iterator<Item = (&'a Job, &'a Step, &'a str)> + 'a {
    model.steps().filter_map(move |(job, step)| {
        let script = step.script()?;
        let name = step.name.as_deref()?;
        contains_keyword(name, names).then_some((job, step, script))
    })
}

/// Health checks must not wait forever
pub struct HealthCheckBounded {
    names: Vec<String>,
}

impl Rule for HealthCheckBounded {
    fn id(&self) -> &'static str {
        "health-check-bounded"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Script
    }

    fn description(&self) -> &'static str {
        "health-check scripts use a bounded loop or a timeout"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        health_checks(model, &self.names)
            .filter(|(_, _, script)| !has_bounded_wait(script))
            .map(|(job, step, _)| {
                Finding::new(
                    Location::step(&model.path, &job.name, step.index),
                    "health check has no bounded loop or timeout and may wait forever",
                )
            })
            .collect()
    }
}

/// Health checks must signal success and failure with distinct exit codes
pub struct HealthCheckExits {
    names: Vec<String>,
}

impl Rule for HealthCheckExits {
    fn id(&self) -> &'static str {
        "health-check-exits"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Script
    }

    fn description(&self) -> &'static str {
        "health-check scripts exit 0 on success and non-zero on failure"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (job, step, script) in health_checks(model, &self.names) {
            let location = Location::step(&model.path, &job.name, step.index);
            if !SUCCESS_EXIT.is_match(script) {
                findings.push(Finding::new(
                    location.clone(),
                    "health check has no success exit ('exit 0')",
                ));
            }
            if !FAILURE_EXIT.is_match(script) {
                findings.push(Finding::new(
                    location,
                    "health check has no failure exit (e.g. 'exit 1')",
                ));
            }
        }
        findings
    }
}

/// Steps producing a value for later steps must write it to the output sink
pub struct OutputSink {
    names: Vec<String>,
    sink: String,
}

impl OutputSink {
    /// Ids of steps whose outputs are read after them in the job
    fn consumed_ids(job: &Job) -> BTreeSet<(String, usize)> {
        let mut consumed = BTreeSet::new();

        for step in &job.steps {
            let Some(id) = &step.id else { continue };
            let later = job.steps.iter().filter(|s| s.index > step.index);
            let read_later = later
                .flat_map(|s| s.text_values())
                .any(|text| referenced_step_outputs(&text).contains(id));
            if read_later {
                consumed.insert((id.clone(), step.index));
            }
        }

        if let Some(outputs) = job.extra_field("outputs").present() {
            let mut values = Vec::new();
            collect_scalars(outputs, &mut values);
            for referenced in values.iter().flat_map(|v| referenced_step_outputs(v)) {
                if let Some(step) = job.steps.iter().find(|s| s.id.as_deref() == Some(referenced.as_str())) {
                    consumed.insert((referenced, step.index));
                }
            }
        }

        consumed
    }
}

impl Rule for OutputSink {
    fn id(&self) -> &'static str {
        "output-sink"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Script
    }

    fn description(&self) -> &'static str {
        "scripts producing outputs write them to the output sink"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let mut findings = Vec::new();

        for job in &model.jobs {
            let consumed: BTreeSet<usize> = Self::consumed_ids(job).into_iter().map(|(_, i)| i).collect();

            for step in &job.steps {
                let Some(script) = step.script() else { continue };
                let named = step
                    .name
                    .as_deref()
                    .is_some_and(|name| contains_keyword(name, &self.names));
                if !named && !consumed.contains(&step.index) {
                    continue;
                }
                if script.contains(&self.sink) {
                    continue;
                }

                let hint = if script.contains("::set-output") {
                    " ('::set-output' is deprecated)"
                } else {
                    ""
                };
                findings.push(Finding::new(
                    Location::step(&model.path, &job.name, step.index),
                    format!(
                        "step produces an output but does not write to ${}{}",
                        self.sink, hint
                    ),
                ));
            }
        }
        findings
    }
}
