//! Security rules: action pinning, hardcoded credentials, token permissions

use crate::core::model::collect_scalars;
use crate::core::{LintPolicy, Location, RuleCategory, WorkflowModel};
use crate::rules::patterns::{overlaps_any, redact, secret_reference_spans, CREDENTIAL_SIGNATURES};
use crate::rules::{Finding, Rule};
use std::collections::{BTreeMap, BTreeSet};

pub fn rules(policy: &LintPolicy) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(PinnedAction {
            floating_refs: policy
                .floating_refs
                .iter()
                .map(|r| r.to_lowercase())
                .collect(),
        }),
        Box::new(HardcodedCredential),
        Box::new(TokenPermissions {
            markers: policy
                .ephemeral_token_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }),
    ]
}

/// Remote action references must pin a version rather than a moving branch
pub struct PinnedAction {
    floating_refs: Vec<String>,
}

impl PinnedAction {
    /// Why `uses` is not pinned, if it is not
    fn problem(&self, uses: &str) -> Option<String> {
        let uses = uses.trim();
        if uses.starts_with("./") || uses.starts_with("docker://") || uses.contains("${{") {
            return None;
        }

        match uses.rsplit_once('@') {
            None => Some(format!("action '{}' is not pinned to a version", uses)),
            Some((_, reference)) if reference.is_empty() => {
                Some(format!("action '{}' has an empty version reference", uses))
            }
            Some((_, reference)) if self.floating_refs.contains(&reference.to_lowercase()) => Some(format!(
                "action '{}' uses floating reference '@{}'; pin a version tag",
                uses, reference
            )),
            Some(_) => None,
        }
    }
}

impl Rule for PinnedAction {
    fn id(&self) -> &'static str {
        "pinned-action"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn description(&self) -> &'static str {
        "actions are pinned to a version, not a branch alias"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let mut findings: Vec<Finding> = model
            .steps()
            .filter_map(|(job, step)| {
                let message = self.problem(step.uses()?)?;
                Some(Finding::new(
                    Location::step(&model.path, &job.name, step.index),
                    message,
                ))
            })
            .collect();

        // Jobs calling a reusable workflow reference it the same way
        for job in &model.jobs {
            if let Some(message) = job
                .extra
                .get("uses")
                .and_then(|uses| uses.as_str())
                .and_then(|uses| self.problem(uses))
            {
                findings.push(Finding::new(Location::job(&model.path, &job.name), message));
            }
        }
        findings
    }
}

/// Scan the raw document for credential signatures.
///
/// The n-th unsuppressed occurrence of a literal in the source is attributed
/// to the holder (document values, then each job and its steps in document
/// order) containing the n-th unsuppressed occurrence of that literal.
/// Matches inside a `secrets.<NAME>` reference are ignored.
pub struct HardcodedCredential;

impl HardcodedCredential {
    /// Every place a literal can live, with its scalar values, in document order
    fn holders(model: &WorkflowModel) -> Vec<(Location, Vec<String>)> {
        let mut document = vec![model.name.clone()];
        document.extend(model.env.values().cloned());
        for value in model.extra.values() {
            collect_scalars(value, &mut document);
        }

        let mut holders = vec![(Location::document(&model.path), document)];
        for job in &model.jobs {
            let mut values: Vec<String> = job.condition.iter().cloned().collect();
            values.extend(job.env.values().cloned());
            for value in job.extra.values() {
                collect_scalars(value, &mut values);
            }
            holders.push((Location::job(&model.path, &job.name), values));

            for step in &job.steps {
                holders.push((
                    Location::step(&model.path, &job.name, step.index),
                    step.text_values(),
                ));
            }
        }
        holders
    }

    fn locate(
        model: &WorkflowModel,
        holders: &[(Location, Vec<String>)],
        secret: &str,
        nth: usize,
    ) -> Location {
        let mut remaining = nth;
        for (location, values) in holders {
            let count: usize = values
                .iter()
                .map(|value| unsuppressed_occurrences(value, secret))
                .sum();
            if remaining < count {
                return location.clone();
            }
            remaining -= count;
        }
        // Comments and other text the model does not keep
        Location::document(&model.path)
    }
}

/// Occurrences of `literal` in `text` outside any `secrets.<NAME>` reference
fn unsuppressed_occurrences(text: &str, literal: &str) -> usize {
    if literal.is_empty() {
        return 0;
    }
    let secret_spans = secret_reference_spans(text);
    text.match_indices(literal)
        .filter(|(start, m)| !overlaps_any(&(*start..start + m.len()), &secret_spans))
        .count()
}

impl Rule for HardcodedCredential {
    fn id(&self) -> &'static str {
        "hardcoded-credential"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn description(&self) -> &'static str {
        "no literal credentials in scripts or values; use secrets"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let source = &model.source;
        let secret_spans = secret_reference_spans(source);

        let holders = Self::holders(model);

        let mut seen = BTreeSet::new();
        let mut findings = Vec::new();

        for (matcher, label) in CREDENTIAL_SIGNATURES.iter() {
            let mut occurrences: BTreeMap<&str, usize> = BTreeMap::new();
            for found in matcher.find_iter(source) {
                if overlaps_any(&found.span, &secret_spans) {
                    continue;
                }

                let nth = occurrences.entry(found.value).or_default();
                let location = Self::locate(model, &holders, found.value, *nth);
                *nth += 1;
                if !seen.insert((location.clone(), matcher.name, found.value)) {
                    continue;
                }

                findings.push(Finding::new(
                    location,
                    format!(
                        "possible {} ({}); reference a secret instead",
                        label,
                        redact(found.value)
                    ),
                ));
            }
        }
        findings
    }
}

/// Documents that reference the ephemeral platform token must scope it
pub struct TokenPermissions {
    markers: Vec<String>,
}

impl Rule for TokenPermissions {
    fn id(&self) -> &'static str {
        "token-permissions"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn description(&self) -> &'static str {
        "workflows using the platform token declare explicit permissions"
    }

    fn check(&self, model: &WorkflowModel) -> Vec<Finding> {
        let source = model.source.to_lowercase();
        let Some(marker) = self.markers.iter().find(|m| source.contains(m.as_str())) else {
            return Vec::new();
        };

        if model.declares_permissions() {
            return Vec::new();
        }

        vec![Finding::new(
            Location::document(&model.path),
            format!(
                "workflow references '{}' but declares no 'permissions'",
                marker
            ),
        )]
    }
}
