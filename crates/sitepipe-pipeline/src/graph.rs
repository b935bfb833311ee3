//! Step graph: addressable steps with dependencies resolved to positions.
//!
//! Dependencies may only point backwards in declaration order, which makes
//! the graph a DAG by construction and lets the engine execute steps
//! sequentially without a topological sort.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use sitepipe_types::{PipelineError, Result};

use crate::document::PipelineDocument;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct StepNode {
    /// 1-based declaration position.
    pub position: usize,
    pub id: String,
    pub task: String,
    pub name: Option<String>,
    /// Positions of prerequisite steps, each strictly smaller than `position`.
    pub depends_on: Vec<usize>,
    pub mode: Option<String>,
    pub modes: Vec<String>,
    pub skip_modes: Vec<String>,
    pub allow_failure: bool,
    /// Explicit retry count; the handler default applies when `None`.
    pub retries: Option<usize>,
    pub retry_delay: Duration,
    /// The raw step object, including engine keys.
    pub options: Value,
}

impl StepNode {
    /// `task#position`, an alternative way to reference the step.
    pub fn alias(&self) -> String {
        format!("{}#{}", self.task, self.position)
    }

    /// Label for logs: the name when present, the id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Every mode the step is restricted to (`mode` plus `modes`).
    pub fn allowed_modes(&self) -> Vec<&str> {
        self.mode
            .iter()
            .chain(self.modes.iter())
            .map(String::as_str)
            .collect()
    }

    /// Whether `selector` names this step by id, task, alias, or position.
    pub fn matches_selector(&self, selector: &str) -> bool {
        let selector = selector.trim();
        selector == self.id
            || selector == self.task
            || selector == self.alias()
            || selector.parse::<usize>().ok() == Some(self.position)
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }
}

#[derive(Debug, Clone)]
pub struct StepGraph {
    pub source: PathBuf,
    pub base_dir: PathBuf,
    steps: Vec<StepNode>,
    by_id: HashMap<String, usize>,
}

// --- Option extraction helpers ---

fn config_error(position: usize, message: impl std::fmt::Display) -> PipelineError {
    PipelineError::ConfigError(format!("step {position}: {message}"))
}

fn string_field(step: &Value, key: &str, position: usize) -> Result<Option<String>> {
    match step.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(_) => Err(config_error(position, format!("'{key}' must be a non-empty string"))),
    }
}

fn string_list(step: &Value, key: &str, position: usize) -> Result<Vec<String>> {
    match step.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(String::from).ok_or_else(|| {
                    config_error(position, format!("'{key}' entries must be strings"))
                })
            })
            .collect(),
        Some(_) => Err(config_error(position, format!("'{key}' must be a string or list"))),
    }
}

fn bool_field(step: &Value, keys: &[&str], position: usize) -> Result<bool> {
    for key in keys {
        match step.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Bool(b)) => return Ok(*b),
            Some(_) => return Err(config_error(position, format!("'{key}' must be a boolean"))),
        }
    }
    Ok(false)
}

fn u64_field(step: &Value, key: &str, position: usize) -> Result<Option<u64>> {
    match step.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            config_error(position, format!("'{key}' must be a non-negative integer"))
        }),
    }
}

/// A `dependsOn` entry as written: number or string.
fn dependency_refs(step: &Value, position: usize) -> Result<Vec<String>> {
    match step.get("dependsOn") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Number(n)) => Ok(vec![n.to_string()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(config_error(position, "'dependsOn' entries must be strings or numbers")),
            })
            .collect(),
        Some(_) => Err(config_error(position, "'dependsOn' must be a string, number, or list")),
    }
}

fn parse_step(raw: &Value, position: usize) -> Result<StepNode> {
    if !raw.is_object() {
        return Err(config_error(position, "step must be a JSON object"));
    }
    let task = string_field(raw, "task", position)?
        .ok_or_else(|| config_error(position, "missing 'task'"))?;
    let id = string_field(raw, "id", position)?.unwrap_or_else(|| format!("{task}-{position}"));
    let retry_delay = u64_field(raw, "retryDelayMs", position)?
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_RETRY_DELAY);

    Ok(StepNode {
        position,
        id,
        task,
        name: string_field(raw, "name", position)?,
        depends_on: Vec::new(),
        mode: string_field(raw, "mode", position)?,
        modes: string_list(raw, "modes", position)?,
        skip_modes: string_list(raw, "skipModes", position)?,
        allow_failure: bool_field(raw, &["allowFailure", "continueOnError"], position)?,
        retries: u64_field(raw, "retries", position)?.map(|n| n as usize),
        retry_delay,
        options: raw.clone(),
    })
}

impl StepGraph {
    /// Build the graph from a merged document.
    pub fn from_document(doc: &PipelineDocument) -> Result<Self> {
        Self::from_steps(doc.steps(), doc.path.clone(), doc.base_dir.clone())
    }

    pub fn from_steps(raw_steps: &[Value], source: PathBuf, base_dir: PathBuf) -> Result<Self> {
        let mut steps = Vec::with_capacity(raw_steps.len());
        let mut by_id: HashMap<String, usize> = HashMap::new();

        for (i, raw) in raw_steps.iter().enumerate() {
            let node = parse_step(raw, i + 1)?;
            if let Some(&first) = by_id.get(&node.id) {
                return Err(PipelineError::DuplicateStepId {
                    id: node.id,
                    first,
                    second: node.position,
                });
            }
            by_id.insert(node.id.clone(), node.position);
            steps.push(node);
        }

        let mut graph = Self {
            source,
            base_dir,
            steps,
            by_id,
        };

        for i in 0..graph.steps.len() {
            let position = i + 1;
            let mut resolved = Vec::new();
            for reference in dependency_refs(&raw_steps[i], position)? {
                let target = graph.resolve_reference(&reference).ok_or_else(|| {
                    PipelineError::InvalidDependency {
                        step: graph.steps[i].id.clone(),
                        reference: reference.clone(),
                        message: "no step with that position, id, or alias".into(),
                    }
                })?;
                if target >= position {
                    return Err(PipelineError::InvalidDependency {
                        step: graph.steps[i].id.clone(),
                        reference,
                        message: format!(
                            "must reference an earlier step (resolves to position {target}, step is at {position})"
                        ),
                    });
                }
                if !resolved.contains(&target) {
                    resolved.push(target);
                }
            }
            graph.steps[i].depends_on = resolved;
        }

        tracing::debug!(steps = graph.steps.len(), "Step graph built");
        Ok(graph)
    }

    /// Resolve a `dependsOn`-style reference to a position.
    fn resolve_reference(&self, reference: &str) -> Option<usize> {
        let reference = reference.trim();
        if let Ok(position) = reference.parse::<usize>() {
            return (1..=self.steps.len()).contains(&position).then_some(position);
        }
        if let Some(&position) = self.by_id.get(reference) {
            return Some(position);
        }
        let (task, pos) = reference.rsplit_once('#')?;
        let position = pos.parse::<usize>().ok()?;
        self.by_position(position)
            .filter(|step| step.task == task)
            .map(|step| step.position)
    }

    pub fn steps(&self) -> &[StepNode] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&StepNode> {
        self.by_id.get(id).and_then(|&p| self.by_position(p))
    }

    pub fn by_position(&self, position: usize) -> Option<&StepNode> {
        position.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Look a step up by position, id, or `task#position` alias.
    pub fn find(&self, reference: &str) -> Option<&StepNode> {
        self.resolve_reference(reference)
            .and_then(|p| self.by_position(p))
    }

    /// Steps listing `position` in their `dependsOn`.
    pub fn dependents(&self, position: usize) -> impl Iterator<Item = &StepNode> {
        self.steps
            .iter()
            .filter(move |s| s.depends_on.contains(&position))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
