//! Shared types, errors, build context, and step results for sitepipe.
//!
//! This crate provides the foundational types used across the other sitepipe crates:
//! - `PipelineError`: unified error taxonomy (config, step, policy, transform, transport)
//! - `TransformError`: failures raised by the JSON tree transform engine
//! - `BuildContext`: mutable state threaded through one pipeline run
//! - `Outcome` and `StepResult`: what a handler returns and what the engine records

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unified error type for all sitepipe subsystems.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // === Configuration Errors ===
    #[error("Pipeline document not found: {}", path.display())]
    DocumentNotFound { path: PathBuf },

    #[error("Malformed pipeline document {}: {message}", path.display())]
    MalformedDocument { path: PathBuf, message: String },

    #[error("Inheritance cycle detected: {chain}")]
    InheritanceCycle { chain: String },

    #[error("Duplicate step id '{id}' at positions {first} and {second}")]
    DuplicateStepId {
        id: String,
        first: usize,
        second: usize,
    },

    #[error("Step '{step}' has invalid dependsOn entry '{reference}': {message}")]
    InvalidDependency {
        step: String,
        reference: String,
        message: String,
    },

    #[error("Pipeline configuration error: {0}")]
    ConfigError(String),

    // === Step Errors ===
    #[error("Task '{task}' failed on step '{step}': {message}")]
    StepFailed {
        task: String,
        step: String,
        message: String,
    },

    #[error("Policy check failed on step '{step}': {message}")]
    PolicyFailure { step: String, message: String },

    #[error("Max retries exhausted for step '{step}' after {attempts} attempts: {message}")]
    RetriesExhausted {
        step: String,
        attempts: usize,
        message: String,
    },

    // === Transform Errors ===
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    // === Transport Errors ===
    #[error("Transport error talking to {target}: {message}")]
    Transport { target: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Generic ===
    #[error("Watch error: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport { .. } | PipelineError::CommandTimeout { .. }
        )
    }

    /// Returns `true` for errors raised while loading or validating a document,
    /// before any step runs.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PipelineError::DocumentNotFound { .. }
                | PipelineError::MalformedDocument { .. }
                | PipelineError::InheritanceCycle { .. }
                | PipelineError::DuplicateStepId { .. }
                | PipelineError::InvalidDependency { .. }
                | PipelineError::ConfigError(_)
        )
    }
}

/// A convenience alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// TransformError: failures of the JSON tree transform engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("invalid path '{path}': {message}")]
    Syntax { path: String, message: String },

    #[error("path '{path}' matched no targets")]
    NoTargets { path: String },

    #[error("nothing exists at '{path}'")]
    NotFound { path: String },

    #[error("expected {expected} at '{path}', found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("index {index} out of bounds at '{path}' (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: i64,
        len: usize,
    },

    #[error("target constraint violated for '{path}': {message} (actual {actual})")]
    Constraint {
        path: String,
        message: String,
        actual: usize,
    },

    #[error("cannot pair '{from}' with '{path}': {message}")]
    Cardinality {
        from: String,
        path: String,
        message: String,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

// ---------------------------------------------------------------------------
// BuildContext: state threaded through one pipeline run
// ---------------------------------------------------------------------------

/// Mutable state shared by the steps of a single run.
///
/// A fresh context is created for every run; handlers read it and publish
/// changes through [`ContextUpdate`], which the engine applies only when the
/// step succeeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildContext {
    /// Output directory of the most recent successful build step.
    pub last_output: Option<PathBuf>,
    /// Files written by the most recent build step.
    pub updated_files: Vec<PathBuf>,
    /// Free-form values published by handlers, keyed by `<step>.<name>`.
    pub values: BTreeMap<String, serde_json::Value>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Merge `update` into the context. A build output replaces the previous
    /// one together with its file list.
    pub fn apply(&mut self, update: ContextUpdate) {
        if let Some(dir) = update.output_dir {
            tracing::debug!(output = %dir.display(), "Build output recorded");
            self.last_output = Some(dir);
            self.updated_files.clear();
        }
        if let Some(files) = update.updated_files {
            self.updated_files = files;
        }
        self.values.extend(update.values);
    }
}

/// Changes a handler asks the engine to make to the [`BuildContext`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub output_dir: Option<PathBuf>,
    pub updated_files: Option<Vec<PathBuf>>,
    pub values: BTreeMap<String, serde_json::Value>,
}

impl ContextUpdate {
    pub fn is_empty(&self) -> bool {
        self.output_dir.is_none() && self.updated_files.is_none() && self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// StepStatus: terminal state of a step in one run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    AllowedFailure,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::AllowedFailure => "allowed_failure",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome: what a handler reports back
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: StepStatus,
    pub message: String,
    pub context_updates: ContextUpdate,
}

impl Outcome {
    /// Create a successful outcome with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Succeeded,
            message: message.into(),
            context_updates: ContextUpdate::default(),
        }
    }

    /// Create a failed outcome with the given reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            message: reason.into(),
            context_updates: ContextUpdate::default(),
        }
    }

    /// Attach context updates to this outcome.
    pub fn with_updates(mut self, updates: ContextUpdate) -> Self {
        self.context_updates = updates;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

// ---------------------------------------------------------------------------
// StepResult: what the engine records per step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub position: usize,
    pub id: String,
    pub task: String,
    pub status: StepStatus,
    pub message: String,
    pub duration_ms: u64,
}

impl StepResult {
    /// `true` unless the step failed without permission to do so.
    pub fn is_ok(&self) -> bool {
        self.status != StepStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_duplicate_step_id() {
        let err = PipelineError::DuplicateStepId {
            id: "build".into(),
            first: 1,
            second: 3,
        };
        assert_eq!(
            err.to_string(),
            "Duplicate step id 'build' at positions 1 and 3"
        );
    }

    #[test]
    fn error_display_invalid_dependency() {
        let err = PipelineError::InvalidDependency {
            step: "verify".into(),
            reference: "deploy".into(),
            message: "unknown step".into(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'verify' has invalid dependsOn entry 'deploy': unknown step"
        );
    }

    #[test]
    fn error_display_step_failed() {
        let err = PipelineError::StepFailed {
            task: "exec".into(),
            step: "lint".into(),
            message: "exit code 2".into(),
        };
        assert_eq!(err.to_string(), "Task 'exec' failed on step 'lint': exit code 2");
    }

    #[test]
    fn error_display_transform_wraps_inner() {
        let err: PipelineError = TransformError::NoTargets {
            path: "items[*]".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Transform error: path 'items[*]' matched no targets"
        );
    }

    #[test]
    fn error_display_constraint_includes_path_and_count() {
        let err = TransformError::Constraint {
            path: "a[*]".into(),
            message: "expected exactly 3 targets".into(),
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "target constraint violated for 'a[*]': expected exactly 3 targets (actual 2)"
        );
    }

    // --- classification ---

    #[test]
    fn transport_and_timeout_are_retryable() {
        let transport = PipelineError::Transport {
            target: "https://example.com".into(),
            message: "connection reset".into(),
        };
        assert!(transport.is_retryable());
        assert!(PipelineError::CommandTimeout { timeout_ms: 10 }.is_retryable());
    }

    #[test]
    fn step_failure_is_not_retryable() {
        let err = PipelineError::StepFailed {
            task: "exec".into(),
            step: "s".into(),
            message: "boom".into(),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_config());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let err = PipelineError::InheritanceCycle {
            chain: "a.json -> b.json -> a.json".into(),
        };
        assert!(err.is_config());
        assert!(!err.is_retryable());
    }

    #[test]
    fn policy_failure_is_neither_config_nor_retryable() {
        let err = PipelineError::PolicyFailure {
            step: "audit".into(),
            message: "2 new warnings".into(),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_config());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::Json(_)));
    }

    // --- BuildContext ---

    #[test]
    fn context_apply_records_build_output() {
        let mut ctx = BuildContext::new();
        ctx.updated_files.push(PathBuf::from("stale.html"));

        ctx.apply(ContextUpdate {
            output_dir: Some(PathBuf::from("dist")),
            updated_files: Some(vec![PathBuf::from("dist/index.html")]),
            values: BTreeMap::new(),
        });

        assert_eq!(ctx.last_output, Some(PathBuf::from("dist")));
        assert_eq!(ctx.updated_files, vec![PathBuf::from("dist/index.html")]);
    }

    #[test]
    fn context_apply_new_output_clears_file_list() {
        let mut ctx = BuildContext::new();
        ctx.updated_files.push(PathBuf::from("old/a.html"));
        ctx.apply(ContextUpdate {
            output_dir: Some(PathBuf::from("new")),
            ..Default::default()
        });
        assert!(ctx.updated_files.is_empty());
    }

    #[test]
    fn context_apply_merges_values() {
        let mut ctx = BuildContext::new();
        ctx.values.insert("keep".into(), serde_json::json!(1));

        let mut values = BTreeMap::new();
        values.insert("added".to_string(), serde_json::json!("x"));
        ctx.apply(ContextUpdate {
            values,
            ..Default::default()
        });

        assert_eq!(ctx.get("keep"), Some(&serde_json::json!(1)));
        assert_eq!(ctx.get("added"), Some(&serde_json::json!("x")));
        assert!(ctx.last_output.is_none());
    }

    // --- StepStatus ---

    #[test]
    fn step_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&StepStatus::AllowedFailure).unwrap(),
            "\"allowed_failure\""
        );
        let status: StepStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(status, StepStatus::Skipped);
        assert_eq!(StepStatus::Succeeded.to_string(), "succeeded");
    }

    // --- Outcome / StepResult ---

    #[test]
    fn outcome_constructors() {
        let ok = Outcome::success("built");
        assert!(ok.is_success());
        assert!(ok.context_updates.is_empty());

        let bad = Outcome::fail("broken link");
        assert_eq!(bad.status, StepStatus::Failed);
        assert_eq!(bad.message, "broken link");
    }

    #[test]
    fn allowed_failure_result_is_ok() {
        let result = StepResult {
            position: 2,
            id: "audit-2".into(),
            task: "audit".into(),
            status: StepStatus::AllowedFailure,
            message: "3 issues".into(),
            duration_ms: 5,
        };
        assert!(result.is_ok());
    }
}
