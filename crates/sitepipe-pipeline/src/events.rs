//! Run events for observers.
//!
//! [`PipelineEvent`]s go out over a [`tokio::sync::broadcast`] channel so a
//! CLI progress printer, a log shipper, or a test can follow a run without
//! touching engine internals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        run_id: String,
        pipeline: String,
        step_count: usize,
        mode: String,
        started_at: String,
    },
    PipelineCompleted {
        run_id: String,
        success: bool,
        duration_ms: u64,
        finished_at: String,
    },
    StepStarted {
        position: usize,
        step_id: String,
        task: String,
    },
    StepCompleted {
        position: usize,
        step_id: String,
        status: String,
        duration_ms: u64,
    },
    StepSkipped {
        position: usize,
        step_id: String,
        reason: String,
    },
    StepFailed {
        position: usize,
        step_id: String,
        error: String,
        allowed: bool,
    },
    WatchTriggered {
        changed: Vec<String>,
        overflow: bool,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit to all current subscribers; dropped silently when there are none.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
