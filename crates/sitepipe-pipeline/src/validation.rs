//! Pipeline validation: lint rules and diagnostics.
//!
//! Structural problems (duplicate ids, bad `dependsOn`) are already rejected
//! while building the [`StepGraph`]. These rules catch mistakes that are only
//! visible with knowledge of task types and their options. Call [`validate`]
//! for advisory diagnostics or [`validate_or_raise`] to fail on the first
//! `Error`-severity issue.

use serde::Serialize;
use serde_json::Value;
use sitepipe_types::{PipelineError, Result};

use crate::graph::{StepGraph, StepNode};
use crate::handler::HandlerRegistry;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub step_id: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &StepGraph) -> Vec<Diagnostic>;
}

fn diagnostic(
    rule: &dyn LintRule,
    severity: Severity,
    step: &StepNode,
    message: String,
    fix: Option<&str>,
) -> Diagnostic {
    Diagnostic {
        rule: rule.name().into(),
        severity,
        message,
        step_id: Some(step.id.clone()),
        fix: fix.map(String::from),
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct KnownTaskRule {
    task_types: Vec<String>,
}
impl LintRule for KnownTaskRule {
    fn name(&self) -> &str { "known_task" }
    fn apply(&self, graph: &StepGraph) -> Vec<Diagnostic> {
        graph
            .steps()
            .iter()
            .filter(|s| !self.task_types.contains(&s.task))
            .map(|s| {
                diagnostic(
                    self,
                    Severity::Error,
                    s,
                    format!("Step '{}' uses unknown task '{}'", s.id, s.task),
                    Some(&format!("Use one of: {}", self.task_types.join(", "))),
                )
            })
            .collect()
    }
}

struct ModeConflictRule;
impl LintRule for ModeConflictRule {
    fn name(&self) -> &str { "mode_conflict" }
    fn apply(&self, graph: &StepGraph) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for step in graph.steps() {
            for mode in step.allowed_modes() {
                if step.skip_modes.iter().any(|m| m == mode) {
                    out.push(diagnostic(
                        self,
                        Severity::Warning,
                        step,
                        format!(
                            "Step '{}' lists mode '{mode}' in both modes and skipModes; skipModes wins",
                            step.id
                        ),
                        Some("Remove the mode from one of the lists"),
                    ));
                }
            }
        }
        out
    }
}

struct TransformOptionsRule;
impl LintRule for TransformOptionsRule {
    fn name(&self) -> &str { "transform_options" }
    fn apply(&self, graph: &StepGraph) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for step in graph.steps().iter().filter(|s| s.task == "transform") {
            for key in ["input", "out"] {
                if step.option_str(key).is_none() {
                    out.push(diagnostic(
                        self,
                        Severity::Error,
                        step,
                        format!("Transform step '{}' is missing '{key}'", step.id),
                        None,
                    ));
                }
            }
            match step.option("operations").and_then(Value::as_array) {
                Some(ops) if !ops.is_empty() => {
                    for (i, op) in ops.iter().enumerate() {
                        if let Err(e) = sitepipe_transform::Operation::from_value(op) {
                            out.push(diagnostic(
                                self,
                                Severity::Error,
                                step,
                                format!("Transform step '{}' operation {i}: {e}", step.id),
                                None,
                            ));
                        }
                    }
                }
                _ => out.push(diagnostic(
                    self,
                    Severity::Error,
                    step,
                    format!("Transform step '{}' needs a non-empty 'operations' array", step.id),
                    None,
                )),
            }
        }
        out
    }
}

struct ExecOptionsRule;
impl LintRule for ExecOptionsRule {
    fn name(&self) -> &str { "exec_options" }
    fn apply(&self, graph: &StepGraph) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for step in graph.steps().iter().filter(|s| s.task == "exec" || s.task == "build") {
            if step.option_str("command").is_none() {
                out.push(diagnostic(
                    self,
                    Severity::Error,
                    step,
                    format!("Step '{}' ({}) is missing 'command'", step.id, step.task),
                    None,
                ));
            }
            if step.task == "build" && step.option_str("out").is_none() {
                out.push(diagnostic(
                    self,
                    Severity::Error,
                    step,
                    format!("Build step '{}' is missing 'out'", step.id),
                    Some("Set 'out' to the directory the build writes"),
                ));
            }
            if let Some(pattern) = step.option_str("warningPattern") {
                if let Err(e) = regex::Regex::new(pattern) {
                    out.push(diagnostic(
                        self,
                        Severity::Error,
                        step,
                        format!("Step '{}' has an invalid warningPattern: {e}", step.id),
                        None,
                    ));
                }
            }
        }
        out
    }
}

struct AllowFailureWithDependentsRule;
impl LintRule for AllowFailureWithDependentsRule {
    fn name(&self) -> &str { "allow_failure_with_dependents" }
    fn apply(&self, graph: &StepGraph) -> Vec<Diagnostic> {
        graph
            .steps()
            .iter()
            .filter(|s| s.allow_failure)
            .filter_map(|s| {
                let dependents: Vec<_> = graph.dependents(s.position).map(|d| d.id.as_str()).collect();
                (!dependents.is_empty()).then(|| {
                    diagnostic(
                        self,
                        Severity::Info,
                        s,
                        format!(
                            "Step '{}' may fail without stopping the run, but {} depend on it",
                            s.id,
                            dependents.join(", ")
                        ),
                        None,
                    )
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(graph: &StepGraph, registry: &HandlerRegistry) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(KnownTaskRule {
            task_types: registry.task_types(),
        }),
        Box::new(ModeConflictRule),
        Box::new(TransformOptionsRule),
        Box::new(ExecOptionsRule),
        Box::new(AllowFailureWithDependentsRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &StepGraph, registry: &HandlerRegistry) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph, registry);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(PipelineError::ConfigError(errors.join("; ")));
    }
    Ok(diagnostics)
}
