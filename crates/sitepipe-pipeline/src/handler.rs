//! Step handler trait, dynamic dispatch wrapper, and handler registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use sitepipe_types::{BuildContext, Outcome, Result};

use crate::graph::StepNode;

/// Per-run inputs every handler receives alongside the step.
#[derive(Debug, Clone)]
pub struct RunEnv {
    pub base_dir: PathBuf,
    /// Active run mode (`default`, `fast`, ...).
    pub mode: String,
    pub run_id: String,
}

impl RunEnv {
    pub fn new(base_dir: impl Into<PathBuf>, mode: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            mode: mode.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Resolve a step-relative path against the base directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

// ---------------------------------------------------------------------------
// StepHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The task type this handler serves (e.g. "exec", "transform").
    fn task_type(&self) -> &str;

    /// Run one step. `Err` and a failed [`Outcome`] both fail the step; the
    /// error form carries classification (retryable, policy, transform).
    async fn execute(&self, step: &StepNode, ctx: &BuildContext, env: &RunEnv) -> Result<Outcome>;

    /// Retries applied when the step does not set `retries`.
    fn default_retries(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// DynHandler: object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynHandler(Box<dyn StepHandler>);

impl DynHandler {
    pub fn new(handler: impl StepHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn task_type(&self) -> &str {
        self.0.task_type()
    }

    pub fn default_retries(&self) -> usize {
        self.0.default_retries()
    }

    pub async fn execute(&self, step: &StepNode, ctx: &BuildContext, env: &RunEnv) -> Result<Outcome> {
        self.0.execute(step, ctx, env).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, DynHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`, replacing any handler for the same task type.
    pub fn register(&mut self, handler: impl StepHandler + 'static) {
        let t = handler.task_type().to_string();
        self.handlers.insert(t, DynHandler::new(handler));
    }

    pub fn get(&self, task_type: &str) -> Option<&DynHandler> {
        self.handlers.get(task_type)
    }

    pub fn has(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Registry with every built-in handler.
pub fn default_registry() -> HandlerRegistry {
    let mut reg = HandlerRegistry::new();
    reg.register(crate::handlers::ExecHandler::exec());
    reg.register(crate::handlers::ExecHandler::build());
    reg.register(crate::handlers::TransformHandler);
    reg.register(crate::handlers::WebhookHandler::default());
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl StepHandler for Noop {
        fn task_type(&self) -> &str {
            "noop"
        }

        async fn execute(&self, step: &StepNode, _ctx: &BuildContext, _env: &RunEnv) -> Result<Outcome> {
            Ok(Outcome::success(format!("{} did nothing", step.id)))
        }
    }

    #[test]
    fn register_and_get_handler() {
        let mut reg = HandlerRegistry::new();
        reg.register(Noop);
        assert!(reg.has("noop"));
        assert_eq!(reg.get("noop").map(DynHandler::task_type), Some("noop"));
        assert_eq!(reg.get("noop").map(DynHandler::default_retries), Some(0));
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn default_registry_has_builtins() {
        let reg = default_registry();
        assert_eq!(reg.task_types(), vec!["build", "exec", "transform", "webhook"]);
        assert_eq!(reg.get("webhook").map(DynHandler::default_retries), Some(2));
    }

    #[test]
    fn run_env_resolves_relative_paths() {
        let env = RunEnv::new("/site", "fast");
        assert_eq!(env.resolve("dist/index.html"), PathBuf::from("/site/dist/index.html"));
        assert_eq!(env.resolve("/abs/x.json"), PathBuf::from("/abs/x.json"));
        assert_eq!(env.mode, "fast");
        assert_eq!(env.run_id.len(), 36);
    }
}
