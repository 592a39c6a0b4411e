//! Model builder: document tree -> [`WorkflowModel`]

use crate::core::model::{
    Job, RunsOn, Step, StepKind, TriggerConfig, Triggers, WorkflowModel,
};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Fatal, document-scoped modelling failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("missing required field '{path}'")]
    MissingField { path: String },

    #[error("field '{path}' is malformed: expected {expected}")]
    Malformed { path: String, expected: String },

    #[error("'jobs' must define at least one job")]
    NoJobs,
}

impl ModelError {
    fn malformed(path: impl Into<String>, expected: &str) -> Self {
        ModelError::Malformed {
            path: path.into(),
            expected: expected.to_string(),
        }
    }
}

/// Keys a step mapping is interpreted through; anything else lands in `extra`
const STEP_KEYS: &[&str] = &["id", "name", "if", "env", "uses", "with", "run", "shell"];
const JOB_KEYS: &[&str] = &["runs-on", "if", "env", "permissions", "steps"];
const WORKFLOW_KEYS: &[&str] = &["name", "on", "env", "permissions", "jobs"];

/// Build a typed model from a parsed document.
///
/// `source` is the raw document text; it is kept on the model for rules that
/// scan unstructured content.
pub fn build_model(path: &Path, source: Arc<str>, tree: &Value) -> Result<WorkflowModel, ModelError> {
    let root = tree
        .as_mapping()
        .ok_or_else(|| ModelError::malformed("$", "a mapping at the document root"))?;

    let name = match root.get("name") {
        None => return Err(ModelError::MissingField { path: "name".into() }),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => String::new(),
        Some(_) => return Err(ModelError::malformed("name", "a string")),
    };

    let jobs_value = root
        .get("jobs")
        .ok_or_else(|| ModelError::MissingField { path: "jobs".into() })?;
    let jobs_map = match jobs_value {
        Value::Mapping(map) => map,
        Value::Null => return Err(ModelError::NoJobs),
        _ => return Err(ModelError::malformed("jobs", "a mapping of job name to job")),
    };
    if jobs_map.is_empty() {
        return Err(ModelError::NoJobs);
    }

    let mut jobs = Vec::with_capacity(jobs_map.len());
    for (key, value) in jobs_map {
        let job_name = scalar_key(key)
            .ok_or_else(|| ModelError::malformed("jobs", "string job names"))?;
        jobs.push(build_job(&job_name, value)?);
    }

    let mut model = WorkflowModel::new(path, source, name)
        .with_permissions(root.get("permissions").cloned());
    model.triggers = normalize_triggers(root)?;
    model.env = string_map(root.get("env"));
    model.jobs = jobs;
    model.extra = root
        .iter()
        .filter(|(key, _)| !is_trigger_key(key) && !is_known(key, WORKFLOW_KEYS))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    debug!(
        "Built model for {}: {} jobs, {} steps",
        path.display(),
        model.jobs.len(),
        model.steps().count()
    );

    Ok(model)
}

/// A trigger key is either the string `on` or the boolean `true`.
///
/// YAML 1.1 parsers resolve an unquoted `on` to a boolean, so a document
/// written as `on: push` may arrive with a `true` key. Both spellings are the
/// same logical field.
fn is_trigger_key(key: &Value) -> bool {
    matches!(key, Value::String(s) if s == "on") || matches!(key, Value::Bool(true))
}

fn normalize_triggers(root: &Mapping) -> Result<Triggers, ModelError> {
    let mut triggers = Triggers::default();

    for (key, value) in root.iter().filter(|(key, _)| is_trigger_key(key)) {
        triggers.declared = true;
        if matches!(key, Value::Bool(_)) {
            debug!("Normalized boolean trigger key to 'on'");
        }

        match value {
            Value::String(kind) => {
                triggers.kinds.entry(kind.clone()).or_default();
            }
            Value::Sequence(kinds) => {
                for kind in kinds {
                    let kind = kind
                        .as_str()
                        .ok_or_else(|| ModelError::malformed("on", "a list of trigger names"))?;
                    triggers.kinds.entry(kind.to_string()).or_default();
                }
            }
            Value::Mapping(map) => {
                for (kind, config) in map {
                    let kind = scalar_key(kind)
                        .ok_or_else(|| ModelError::malformed("on", "string trigger names"))?;
                    triggers.kinds.insert(kind, trigger_config(config));
                }
            }
            Value::Null => {}
            _ => return Err(ModelError::malformed("on", "a trigger name, list or mapping")),
        }
    }

    Ok(triggers)
}

fn trigger_config(value: &Value) -> TriggerConfig {
    let filter = |key: &str| value.get(key).map(string_list);
    TriggerConfig {
        branches: filter("branches"),
        branches_ignore: filter("branches-ignore"),
        tags: filter("tags"),
        paths: filter("paths"),
        raw: value.clone(),
    }
}

fn build_job(name: &str, value: &Value) -> Result<Job, ModelError> {
    let map = value
        .as_mapping()
        .ok_or_else(|| ModelError::malformed(format!("jobs.{}", name), "a mapping"))?;

    let runs_on = match map.get("runs-on") {
        None | Some(Value::Null) => RunsOn::Absent,
        Some(Value::String(label)) => RunsOn::Label(label.clone()),
        Some(Value::Sequence(labels)) => RunsOn::Labels(
            labels.iter().filter_map(scalar_key).collect(),
        ),
        Some(_) => RunsOn::Other,
    };

    let steps = match map.get("steps") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| build_step(index, item))
            .collect(),
        Some(_) => {
            return Err(ModelError::malformed(
                format!("jobs.{}.steps", name),
                "a sequence of steps",
            ))
        }
    };

    let mut job = Job::new(name).with_permissions(map.get("permissions").cloned());
    job.runs_on = runs_on;
    job.condition = map.get("if").and_then(scalar_key);
    job.env = string_map(map.get("env"));
    job.steps = steps;
    job.extra = unknown_keys(map, JOB_KEYS);
    Ok(job)
}

/// Steps never fail the document; malformed ones become invalid placeholders
fn build_step(index: usize, value: &Value) -> Step {
    let Some(map) = value.as_mapping() else {
        return Step {
            index,
            id: None,
            name: None,
            condition: None,
            env: BTreeMap::new(),
            kind: StepKind::Invalid {
                reason: "step is not a mapping".to_string(),
            },
            extra: Mapping::new(),
        };
    };

    let uses = map.get("uses");
    let run = map.get("run");
    let kind = match (uses, run) {
        (Some(_), Some(_)) => StepKind::Invalid {
            reason: "step declares both 'uses' and 'run'".to_string(),
        },
        (None, None) => StepKind::Invalid {
            reason: "step declares neither 'uses' nor 'run'".to_string(),
        },
        (Some(uses), None) => match scalar_key(uses) {
            Some(uses) => StepKind::Action {
                uses,
                with: map
                    .get("with")
                    .and_then(Value::as_mapping)
                    .cloned()
                    .unwrap_or_default(),
            },
            None => StepKind::Invalid {
                reason: "'uses' must be a string".to_string(),
            },
        },
        (None, Some(run)) => match scalar_key(run) {
            Some(run) => StepKind::Command {
                run,
                shell: map.get("shell").and_then(scalar_key),
            },
            None => StepKind::Invalid {
                reason: "'run' must be a string".to_string(),
            },
        },
    };

    // `with` and `env` the typed fields could not hold stay visible as extras
    let mut extra = unknown_keys(map, STEP_KEYS);
    let with_consumed =
        matches!(kind, StepKind::Action { .. }) && map.get("with").is_some_and(Value::is_mapping);
    if !with_consumed {
        if let Some(with) = map.get("with") {
            extra.insert(Value::from("with"), with.clone());
        }
    }
    if let Some(env) = map.get("env").filter(|env| !env.is_mapping()) {
        extra.insert(Value::from("env"), env.clone());
    }

    Step {
        index,
        id: map.get("id").and_then(scalar_key),
        name: map.get("name").and_then(scalar_key),
        condition: map.get("if").and_then(scalar_key),
        env: string_map(map.get("env")),
        kind,
        extra,
    }
}

fn is_known(key: &Value, known: &[&str]) -> bool {
    key.as_str().is_some_and(|k| known.contains(&k))
}

fn unknown_keys(map: &Mapping, known: &[&str]) -> Mapping {
    map.iter()
        .filter(|(key, _)| !is_known(key, known))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Render a scalar as a string; `None` for collections and null
fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_key).collect(),
        other => scalar_key(other).into_iter().collect(),
    }
}

/// Environment-style mappings; non-scalar values are rendered as YAML
fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Mapping(map)) = value else {
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(key, value)| {
            let key = scalar_key(key)?;
            let value = scalar_key(value).unwrap_or_else(|| {
                serde_yaml::to_string(value)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default()
            });
            Some((key, value))
        })
        .collect()
}
