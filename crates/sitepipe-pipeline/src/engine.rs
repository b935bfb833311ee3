//! Pipeline execution engine: the sequential step loop.
//!
//! Lifecycle: load, build graph, validate (in [`PipelineExecutor::run_file`]),
//! then execute steps in declaration order against a fresh [`BuildContext`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sitepipe_types::{BuildContext, Outcome, PipelineError, Result, StepResult, StepStatus};

use crate::document::load_document;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{StepGraph, StepNode};
use crate::handler::{default_registry, HandlerRegistry, RunEnv};
use crate::retry::{execute_with_retry, BackoffPolicy};
use crate::truncation::{truncate_message, MAX_MESSAGE_CHARS};
use crate::validation::{validate_or_raise, Severity};

pub const DEFAULT_MODE: &str = "default";
pub const FAST_MODE: &str = "fast";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Filtering inputs for one run. They decide which steps run, never the
/// shape of the graph.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Option<String>,
    /// When non-empty, only matching steps run.
    pub only: Vec<String>,
    pub skip: Vec<String>,
    pub base_dir_override: Option<PathBuf>,
}

impl RunOptions {
    pub fn fast() -> Self {
        Self {
            mode: Some(FAST_MODE.into()),
            ..Self::default()
        }
    }

    pub fn active_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or(DEFAULT_MODE)
    }

    /// Why `step` is not eligible in this run, or `None` when it should run.
    pub fn skip_reason(&self, step: &StepNode) -> Option<String> {
        if self.skip.iter().any(|s| step.matches_selector(s)) {
            return Some("excluded by --skip".into());
        }
        if !self.only.is_empty() && !self.only.iter().any(|s| step.matches_selector(s)) {
            return Some("not selected by --only".into());
        }
        let mode = self.active_mode();
        if step.skip_modes.iter().any(|m| m == mode) {
            return Some(format!("mode '{mode}' is in skipModes"));
        }
        let allowed = step.allowed_modes();
        if !allowed.is_empty() && !allowed.contains(&mode) {
            return Some(format!("runs only in modes [{}]", allowed.join(", ")));
        }
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub mode: String,
    pub steps: Vec<StepResult>,
    /// No step failed without permission.
    pub success: bool,
    pub duration_ms: u64,
    /// Position of the step whose failure stopped the run.
    pub aborted_at: Option<usize>,
}

impl PipelineResult {
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Owns a handler registry and drives step execution.
pub struct PipelineExecutor {
    registry: HandlerRegistry,
    events: Option<EventEmitter>,
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

impl PipelineExecutor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            events: None,
        }
    }

    /// Executor pre-loaded with the built-in handlers.
    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn events(&self) -> Option<&EventEmitter> {
        self.events.as_ref()
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Load, build, validate, and run the document at `path`.
    pub async fn run_file(&self, path: impl AsRef<Path>, options: &RunOptions) -> Result<PipelineResult> {
        let doc = load_document(path)?;
        let graph = StepGraph::from_document(&doc)?;
        for diag in validate_or_raise(&graph, &self.registry)? {
            match diag.severity {
                Severity::Warning => tracing::warn!(rule = %diag.rule, "{}", diag.message),
                _ => tracing::debug!(rule = %diag.rule, "{}", diag.message),
            }
        }
        self.run(&graph, options).await
    }

    /// Execute every eligible step of `graph` in order.
    ///
    /// A failing step that does not allow failure stops the run; later steps
    /// are neither executed nor recorded.
    pub async fn run(&self, graph: &StepGraph, options: &RunOptions) -> Result<PipelineResult> {
        let started = Instant::now();
        let base_dir = options
            .base_dir_override
            .clone()
            .unwrap_or_else(|| graph.base_dir.clone());
        let env = RunEnv::new(base_dir, options.active_mode());
        let mut ctx = BuildContext::new();
        let mut results: Vec<StepResult> = Vec::with_capacity(graph.len());
        let mut aborted_at = None;

        tracing::info!(run_id = %env.run_id, steps = graph.len(), mode = %env.mode, "Pipeline started");
        self.emit(PipelineEvent::PipelineStarted {
            run_id: env.run_id.clone(),
            pipeline: graph.source.display().to_string(),
            step_count: graph.len(),
            mode: env.mode.clone(),
            started_at: chrono::Utc::now().to_rfc3339(),
        });

        for step in graph.steps() {
            if let Some(reason) = options.skip_reason(step) {
                tracing::info!(step = %step.id, reason = %reason, "Step skipped");
                self.emit(PipelineEvent::StepSkipped {
                    position: step.position,
                    step_id: step.id.clone(),
                    reason: reason.clone(),
                });
                results.push(record(step, StepStatus::Skipped, reason, 0));
                continue;
            }

            for dep in &step.depends_on {
                let ran = results
                    .iter()
                    .any(|r| r.position == *dep && r.status == StepStatus::Succeeded);
                if !ran {
                    tracing::warn!(step = %step.id, dependency = *dep, "Dependency did not succeed in this run");
                }
            }

            tracing::info!(step = %step.id, task = %step.task, label = %step.label(), "Step started");
            self.emit(PipelineEvent::StepStarted {
                position: step.position,
                step_id: step.id.clone(),
                task: step.task.clone(),
            });

            let step_start = Instant::now();
            let outcome = self.execute_step(step, &ctx, &env).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(outcome) if outcome.is_success() => {
                    ctx.apply(outcome.context_updates);
                    tracing::info!(step = %step.id, duration_ms, "Step succeeded");
                    self.emit(PipelineEvent::StepCompleted {
                        position: step.position,
                        step_id: step.id.clone(),
                        status: StepStatus::Succeeded.to_string(),
                        duration_ms,
                    });
                    results.push(record(step, StepStatus::Succeeded, outcome.message, duration_ms));
                    continue;
                }
                Ok(outcome) => outcome.message,
                Err(e) => e.to_string(),
            };

            let message = truncate_message(&failure, MAX_MESSAGE_CHARS);
            self.emit(PipelineEvent::StepFailed {
                position: step.position,
                step_id: step.id.clone(),
                error: message.clone(),
                allowed: step.allow_failure,
            });
            if step.allow_failure {
                tracing::warn!(step = %step.id, error = %message, "Step failed (allowed)");
                results.push(record(step, StepStatus::AllowedFailure, message, duration_ms));
                continue;
            }

            tracing::error!(step = %step.id, error = %message, "Step failed, stopping pipeline");
            results.push(record(step, StepStatus::Failed, message, duration_ms));
            aborted_at = Some(step.position);
            break;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let success = results.iter().all(StepResult::is_ok);
        tracing::info!(
            run_id = %env.run_id,
            success,
            duration_ms,
            "Pipeline finished"
        );
        self.emit(PipelineEvent::PipelineCompleted {
            run_id: env.run_id.clone(),
            success,
            duration_ms,
            finished_at: chrono::Utc::now().to_rfc3339(),
        });

        Ok(PipelineResult {
            run_id: env.run_id,
            mode: env.mode,
            steps: results,
            success,
            duration_ms,
            aborted_at,
        })
    }

    /// Dispatch to the step's handler, retrying transient errors.
    async fn execute_step(&self, step: &StepNode, ctx: &BuildContext, env: &RunEnv) -> Result<Outcome> {
        let handler = self
            .registry
            .get(&step.task)
            .ok_or_else(|| PipelineError::StepFailed {
                task: step.task.clone(),
                step: step.id.clone(),
                message: format!("no handler registered for task '{}'", step.task),
            })?;
        let retries = step.retries.unwrap_or_else(|| handler.default_retries());
        let policy = BackoffPolicy::for_delay(step.retry_delay);
        execute_with_retry(move || handler.execute(step, ctx, env), retries, &policy, &step.id).await
    }
}

fn record(step: &StepNode, status: StepStatus, message: String, duration_ms: u64) -> StepResult {
    StepResult {
        position: step.position,
        id: step.id.clone(),
        task: step.task.clone(),
        status,
        message,
        duration_ms,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
