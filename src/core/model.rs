//! Workflow domain model
//!
//! A [`WorkflowModel`] is the typed view of one workflow document. It is
//! built once by the model builder and never mutated afterwards; rules only
//! ever receive shared references to it.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Result of looking up an optional field.
///
/// Rules use this to tell a missing key apart from a key that is present but
/// carries no content (`""`, `~`, `{}` or `[]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Empty,
    Present(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// True when the key exists, even if its value is empty
    pub fn is_declared(&self) -> bool {
        !self.is_absent()
    }

    pub fn present(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<'a> Field<&'a str> {
    /// Classify an optional string
    pub fn from_str_option(value: Option<&'a str>) -> Self {
        match value {
            None => Field::Absent,
            Some(s) if s.trim().is_empty() => Field::Empty,
            Some(s) => Field::Present(s),
        }
    }
}

impl<'a> Field<&'a Value> {
    /// Classify an optional raw value
    pub fn from_value(value: Option<&'a Value>) -> Self {
        match value {
            None => Field::Absent,
            Some(Value::Null) => Field::Empty,
            Some(Value::String(s)) if s.trim().is_empty() => Field::Empty,
            Some(Value::Mapping(m)) if m.is_empty() => Field::Empty,
            Some(Value::Sequence(s)) if s.is_empty() => Field::Empty,
            Some(other) => Field::Present(other),
        }
    }
}

/// Configuration attached to one trigger kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerConfig {
    /// `branches` filter, `None` when the trigger does not filter by branch
    pub branches: Option<Vec<String>>,
    pub branches_ignore: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub paths: Option<Vec<String>>,

    /// The original value under the trigger key
    pub raw: Value,
}

/// The trigger field of a workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triggers {
    /// Whether the trigger field appeared in the document at all
    pub declared: bool,

    /// Trigger kind -> configuration
    pub kinds: BTreeMap<String, TriggerConfig>,
}

impl Triggers {
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Option<&TriggerConfig> {
        self.kinds.get(kind)
    }
}

/// Runner selection of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunsOn {
    Absent,
    Label(String),
    Labels(Vec<String>),
    /// Mapping form (`group`/`labels`) or anything else kept opaque
    Other,
}

impl RunsOn {
    pub fn labels(&self) -> Vec<&str> {
        match self {
            RunsOn::Label(label) => vec![label.as_str()],
            RunsOn::Labels(labels) => labels.iter().map(String::as_str).collect(),
            RunsOn::Absent | RunsOn::Other => Vec::new(),
        }
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// `uses:` a packaged action
    Action { uses: String, with: Mapping },
    /// `run:` an inline script
    Command { run: String, shell: Option<String> },
    /// Placeholder for a step that is neither (or both)
    Invalid { reason: String },
}

/// A single step in a job
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Position in the source sequence
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub condition: Option<String>,
    pub env: BTreeMap<String, String>,
    pub kind: StepKind,

    /// Keys the model does not interpret
    pub extra: Mapping,
}

impl Step {
    pub fn name_field(&self) -> Field<&str> {
        Field::from_str_option(self.name.as_deref())
    }

    pub fn condition_field(&self) -> Field<&str> {
        Field::from_str_option(self.condition.as_deref())
    }

    /// Lowercased step name, empty when unnamed
    pub fn name_lower(&self) -> String {
        self.name.as_deref().unwrap_or_default().to_lowercase()
    }

    pub fn uses(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Action { uses, .. } => Some(uses),
            _ => None,
        }
    }

    pub fn script(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Command { run, .. } => Some(run),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, StepKind::Invalid { .. })
    }

    /// Look up an action input under `with:`
    pub fn with_param(&self, key: &str) -> Field<&Value> {
        match &self.kind {
            StepKind::Action { with, .. } => Field::from_value(with.get(key)),
            _ => Field::Absent,
        }
    }

    /// Every scalar value carried by the step, in a stable order
    pub fn text_values(&self) -> Vec<String> {
        let mut values = Vec::new();
        if let Some(name) = &self.name {
            values.push(name.clone());
        }
        if let Some(condition) = &self.condition {
            values.push(condition.clone());
        }
        match &self.kind {
            StepKind::Action { uses, with } => {
                values.push(uses.clone());
                for value in with.values() {
                    collect_scalars(value, &mut values);
                }
            }
            StepKind::Command { run, .. } => values.push(run.clone()),
            StepKind::Invalid { .. } => {}
        }
        values.extend(self.env.values().cloned());
        for value in self.extra.values() {
            collect_scalars(value, &mut values);
        }
        values
    }
}

/// A job: an ordered group of steps
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub runs_on: RunsOn,
    pub condition: Option<String>,
    pub env: BTreeMap<String, String>,
    permissions: Option<Value>,
    pub steps: Vec<Step>,

    /// Keys the model does not interpret (`needs`, `outputs`, ...)
    pub extra: Mapping,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs_on: RunsOn::Absent,
            condition: None,
            env: BTreeMap::new(),
            permissions: None,
            steps: Vec::new(),
            extra: Mapping::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Option<Value>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn permissions(&self) -> Field<&Value> {
        Field::from_value(self.permissions.as_ref())
    }

    /// Jobs that call a reusable workflow have no steps or runner of their own
    pub fn is_reusable_call(&self) -> bool {
        self.extra.contains_key("uses")
    }

    pub fn extra_field(&self, key: &str) -> Field<&Value> {
        Field::from_value(self.extra.get(key))
    }
}

/// One parsed workflow document
#[derive(Debug, Clone)]
pub struct WorkflowModel {
    pub path: PathBuf,

    /// Raw source text, for rules that scan unstructured content
    pub source: Arc<str>,

    pub name: String,
    pub triggers: Triggers,
    pub env: BTreeMap<String, String>,
    permissions: Option<Value>,

    /// Job name -> job, in document order
    pub jobs: Vec<Job>,

    /// Top-level keys the model does not interpret
    pub extra: Mapping,
}

impl WorkflowModel {
    pub fn new(path: impl Into<PathBuf>, source: Arc<str>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source,
            name: name.into(),
            triggers: Triggers::default(),
            env: BTreeMap::new(),
            permissions: None,
            jobs: Vec::new(),
            extra: Mapping::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Option<Value>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn permissions(&self) -> Field<&Value> {
        Field::from_value(self.permissions.as_ref())
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Every step of every job, paired with its job
    pub fn steps(&self) -> impl Iterator<Item = (&Job, &Step)> {
        self.jobs
            .iter()
            .flat_map(|job| job.steps.iter().map(move |step| (job, step)))
    }

    /// Whether `permissions` is declared at document level or on any job
    pub fn declares_permissions(&self) -> bool {
        self.permissions().is_declared()
            || self.jobs.iter().any(|job| job.permissions().is_declared())
    }
}

/// Flatten every scalar inside a value into `out`
pub(crate) fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Sequence(items) => {
            for item in items {
                collect_scalars(item, out);
            }
        }
        Value::Mapping(map) => {
            for item in map.values() {
                collect_scalars(item, out);
            }
        }
        Value::Tagged(tagged) => collect_scalars(&tagged.value, out),
        Value::Null => {}
    }
}
