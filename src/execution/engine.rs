//! Evaluation engine - applies the rule catalog to every loaded document

use crate::{
    core::{load_directory, Diagnostic, LintPolicy, LoadError, LoadedDocument, WorkflowModel},
    execution::report::{exclusion_diagnostic, ExcludedEntry, RunReport},
    rules::RuleRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info};

/// Strategy for scheduling document evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Evaluate documents one at a time, in path order
    #[default]
    Sequential,

    /// Evaluate every document concurrently
    Parallel,

    /// At most N documents in flight at once
    LimitedParallel(usize),
}

/// Failure that aborts a run without a verdict
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("evaluation aborted: {0}")]
    Aborted(String),
}

impl From<JoinError> for EngineError {
    fn from(error: JoinError) -> Self {
        EngineError::Aborted(error.to_string())
    }
}

/// Everything one evaluation run needs, built once per invocation
pub struct RunContext {
    pub documents: Vec<LoadedDocument>,
    pub registry: Arc<RuleRegistry>,
}

impl RunContext {
    pub fn new(documents: Vec<LoadedDocument>, registry: Arc<RuleRegistry>) -> Self {
        Self { documents, registry }
    }

    /// Load every workflow in `dir` and resolve the rule catalog from `policy`
    pub async fn load(dir: &Path, policy: &LintPolicy) -> Result<Self, LoadError> {
        let documents = load_directory(dir, &policy.extensions).await?;
        let registry = Arc::new(RuleRegistry::from_policy(policy));
        Ok(Self::new(documents, registry))
    }

    /// Documents that were modelled successfully
    pub fn models(&self) -> Vec<Arc<WorkflowModel>> {
        self.documents
            .iter()
            .filter_map(|document| match document {
                LoadedDocument::Model(model) => Some(model.clone()),
                LoadedDocument::Excluded(_) => None,
            })
            .collect()
    }
}

/// Progress notifications emitted during a run
#[derive(Debug, Clone)]
pub enum EvaluationEvent {
    DocumentEvaluated {
        path: PathBuf,
        diagnostics: usize,
        excluded: bool,
    },
    RunCompleted {
        documents: usize,
        errors: usize,
        warnings: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(EvaluationEvent) + Send + Sync>;

/// Runs the rule catalog over a [`RunContext`]
#[derive(Default)]
pub struct EvaluationEngine {
    strategy: SchedulingStrategy,
    event_handlers: Vec<EventHandler>,
}

impl EvaluationEngine {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self {
            strategy,
            event_handlers: Vec::new(),
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(EvaluationEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: EvaluationEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Evaluate every document of the run.
    ///
    /// Per-document rules run on blocking workers as the strategy allows;
    /// cross-document rules run once all documents are done. The report is
    /// the same whichever strategy is used.
    pub async fn evaluate(&self, ctx: &RunContext) -> Result<RunReport, EngineError> {
        let models = ctx.models();
        info!(
            "Evaluating {} documents against {} rules ({:?})",
            ctx.documents.len(),
            ctx.registry.len(),
            self.strategy
        );

        let mut diagnostics = Vec::new();
        let mut excluded = Vec::new();

        for document in &ctx.documents {
            if let LoadedDocument::Excluded(doc) = document {
                diagnostics.push(exclusion_diagnostic(doc));
                excluded.push(ExcludedEntry::from(doc));
                self.emit_event(EvaluationEvent::DocumentEvaluated {
                    path: doc.path.clone(),
                    diagnostics: 1,
                    excluded: true,
                });
            }
        }

        let per_document = match self.strategy {
            SchedulingStrategy::Sequential => self.evaluate_sequential(&models, &ctx.registry).await?,
            SchedulingStrategy::Parallel => self.evaluate_concurrent(&models, &ctx.registry, None).await?,
            SchedulingStrategy::LimitedParallel(limit) => {
                self.evaluate_concurrent(&models, &ctx.registry, Some(limit.max(1)))
                    .await?
            }
        };
        diagnostics.extend(per_document);

        let registry = ctx.registry.clone();
        let all_models = models.clone();
        let cross_document = tokio::task::spawn_blocking(move || {
            registry
                .rules()
                .iter()
                .flat_map(|rule| rule.evaluate_all(&all_models))
                .collect::<Vec<_>>()
        })
        .await?;
        debug!("Cross-document rules produced {} diagnostics", cross_document.len());
        diagnostics.extend(cross_document);

        let documents = models.iter().map(|model| model.path.clone()).collect();
        let report = RunReport::new(documents, excluded, diagnostics);

        let counts = report.counts();
        info!(
            "Evaluation complete: {} errors, {} warnings",
            counts.errors, counts.warnings
        );
        self.emit_event(EvaluationEvent::RunCompleted {
            documents: report.total_documents(),
            errors: counts.errors,
            warnings: counts.warnings,
        });

        Ok(report)
    }

    async fn evaluate_sequential(
        &self,
        models: &[Arc<WorkflowModel>],
        registry: &Arc<RuleRegistry>,
    ) -> Result<Vec<Diagnostic>, EngineError> {
        let mut diagnostics = Vec::new();
        for model in models {
            let found = evaluate_document(model.clone(), registry.clone()).await?;
            self.document_done(model, &found);
            diagnostics.extend(found);
        }
        Ok(diagnostics)
    }

    async fn evaluate_concurrent(
        &self,
        models: &[Arc<WorkflowModel>],
        registry: &Arc<RuleRegistry>,
        limit: Option<usize>,
    ) -> Result<Vec<Diagnostic>, EngineError> {
        let permits = limit.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();

        for model in models {
            let model = model.clone();
            let registry = registry.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = match permits {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| EngineError::Aborted(e.to_string()))?,
                    ),
                    None => None,
                };
                let found = evaluate_document(model.clone(), registry).await?;
                Ok::<_, EngineError>((model, found))
            });
        }

        let mut diagnostics = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (model, found) = joined??;
            self.document_done(&model, &found);
            diagnostics.extend(found);
        }
        Ok(diagnostics)
    }

    fn document_done(&self, model: &WorkflowModel, found: &[Diagnostic]) {
        debug!("{}: {} diagnostics", model.path.display(), found.len());
        self.emit_event(EvaluationEvent::DocumentEvaluated {
            path: model.path.clone(),
            diagnostics: found.len(),
            excluded: false,
        });
    }
}

/// Apply the whole catalog to one document on a blocking worker
async fn evaluate_document(
    model: Arc<WorkflowModel>,
    registry: Arc<RuleRegistry>,
) -> Result<Vec<Diagnostic>, EngineError> {
    Ok(tokio::task::spawn_blocking(move || registry.evaluate(&model)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, Location, RuleCategory};
    use crate::execution::report::Verdict;
    use crate::rules::{Finding, Rule};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CLEAN: &str = r#"
name: "Continuous integration"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout
        uses: actions/checkout@v4
      - name: Build
        run: make
"#;

    fn context(files: &[(&str, &str)]) -> RunContext {
        let documents = files
            .iter()
            .map(|(path, source)| LoadedDocument::from_document(&Document::new(*path, *source)))
            .collect();
        RunContext::new(
            documents,
            Arc::new(RuleRegistry::from_policy(&LintPolicy::default())),
        )
    }

    #[tokio::test]
    async fn test_clean_document_passes() {
        let ctx = context(&[("ci.yml", CLEAN)]);
        let report = EvaluationEngine::default().evaluate(&ctx).await.unwrap();
        assert_eq!(report.verdict(), Verdict::Pass, "{:?}", report.diagnostics);
        assert_eq!(report.documents, vec![PathBuf::from("ci.yml")]);
    }

    #[tokio::test]
    async fn test_excluded_document_is_reported_once() {
        let ctx = context(&[("a.yml", CLEAN), ("broken.yml", "jobs: [\n"), ("c.yml", CLEAN)]);
        let report = EvaluationEngine::default().evaluate(&ctx).await.unwrap();

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.excluded.len(), 1);
        let parse_errors: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.rule_id == "parse-error")
            .collect();
        assert_eq!(parse_errors.len(), 1);
        assert_eq!(report.verdict(), Verdict::Fail);
    }

    #[tokio::test]
    async fn test_strategies_agree() {
        let files = [
            ("a.yml", CLEAN),
            ("b.yml", "name: CI\non: pull_request\njobs:\n  x:\n    steps:\n      - uses: owner/action@main\n"),
            ("c.yml", "name: [\n"),
        ];
        let ctx = context(&files);

        let sequential = EvaluationEngine::new(SchedulingStrategy::Sequential)
            .evaluate(&ctx)
            .await
            .unwrap();
        let parallel = EvaluationEngine::new(SchedulingStrategy::Parallel)
            .evaluate(&ctx)
            .await
            .unwrap();
        let limited = EvaluationEngine::new(SchedulingStrategy::LimitedParallel(2))
            .evaluate(&ctx)
            .await
            .unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(sequential, limited);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let evaluated = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut engine = EvaluationEngine::new(SchedulingStrategy::Parallel);
        let (e, c) = (evaluated.clone(), completed.clone());
        engine.add_event_handler(move |event| match event {
            EvaluationEvent::DocumentEvaluated { .. } => {
                e.fetch_add(1, Ordering::SeqCst);
            }
            EvaluationEvent::RunCompleted { documents, .. } => {
                c.store(documents, Ordering::SeqCst);
            }
        });

        let ctx = context(&[("a.yml", CLEAN), ("b.yml", "x: [\n")]);
        engine.evaluate(&ctx).await.unwrap();

        assert_eq!(evaluated.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    struct PanickingRule;

    impl Rule for PanickingRule {
        fn id(&self) -> &'static str {
            "panicking"
        }

        fn category(&self) -> RuleCategory {
            RuleCategory::Structural
        }

        fn description(&self) -> &'static str {
            "always panics"
        }

        fn check(&self, _model: &WorkflowModel) -> Vec<Finding> {
            panic!("rule bug");
        }
    }

    #[tokio::test]
    async fn test_worker_failure_aborts_run() {
        let mut registry = RuleRegistry::new();
        registry.register(Box::new(PanickingRule));
        let documents = vec![LoadedDocument::from_document(&Document::new("ci.yml", CLEAN))];
        let ctx = RunContext::new(documents, Arc::new(registry));

        let result = EvaluationEngine::default().evaluate(&ctx).await;
        assert!(matches!(result, Err(EngineError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_cross_document_rules_run() {
        struct CountingRule;

        impl Rule for CountingRule {
            fn id(&self) -> &'static str {
                "counting"
            }

            fn category(&self) -> RuleCategory {
                RuleCategory::Structural
            }

            fn description(&self) -> &'static str {
                "reports the run size"
            }

            fn check(&self, _model: &WorkflowModel) -> Vec<Finding> {
                Vec::new()
            }

            fn check_all(&self, models: &[Arc<WorkflowModel>]) -> Vec<Finding> {
                vec![Finding::new(Location::default(), format!("{} models", models.len()))]
            }
        }

        let mut registry = RuleRegistry::new();
        registry.register(Box::new(CountingRule));
        let documents = vec![
            LoadedDocument::from_document(&Document::new("a.yml", CLEAN)),
            LoadedDocument::from_document(&Document::new("b.yml", CLEAN)),
        ];
        let report = EvaluationEngine::default()
            .evaluate(&RunContext::new(documents, Arc::new(registry)))
            .await
            .unwrap();

        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].message, "2 models");
    }
}
