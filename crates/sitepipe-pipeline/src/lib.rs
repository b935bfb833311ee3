//! Pipeline loading, step handlers, validation, and execution.
//!
//! This crate implements the sitepipe runner: pipeline documents with
//! `extends` inheritance, the ordered step graph, mode and selector
//! filtering, handler dispatch with retries, warning baselines, and the
//! debounced watch loop.

pub mod document;
pub mod engine;
pub mod events;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod retry;
pub mod truncation;
pub mod validation;
pub mod watch;

pub use document::{deep_merge, load_document, PipelineDocument};
pub use engine::{PipelineExecutor, PipelineResult, RunOptions, DEFAULT_MODE, FAST_MODE};
pub use events::{EventEmitter, PipelineEvent};
pub use graph::{StepGraph, StepNode};
pub use handler::{default_registry, DynHandler, HandlerRegistry, RunEnv, StepHandler};
pub use handlers::{ExecHandler, TransformHandler, WebhookHandler};
pub use retry::{execute_with_retry, BackoffPolicy};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
pub use watch::{
    spawn_fs_watcher, CancelSignal, ChangeFilter, FileRunner, RunTrigger, WatchConfig,
    WatchController, WatchSignal, WatchStats,
};
