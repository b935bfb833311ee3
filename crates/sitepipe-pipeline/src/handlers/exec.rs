use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use sitepipe_types::{BuildContext, ContextUpdate, Outcome, PipelineError, Result};

use crate::graph::StepNode;
use crate::handler::{RunEnv, StepHandler};
use crate::truncation::truncate_output;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAX_CAPTURED_CHARS: usize = 4_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecKind {
    Exec,
    Build,
}

// ---------------------------------------------------------------------------
// ExecHandler: shell command, optionally tracked as a build
// ---------------------------------------------------------------------------

/// Runs `command` through `sh -c`.
///
/// As `build`, the step must also name its output directory (`out`); on
/// success that directory and the files modified during the step are
/// published to the [`BuildContext`].
pub struct ExecHandler {
    kind: ExecKind,
}

impl ExecHandler {
    pub fn exec() -> Self {
        Self { kind: ExecKind::Exec }
    }

    pub fn build() -> Self {
        Self { kind: ExecKind::Build }
    }
}

struct CommandOutput {
    exit_code: i32,
    success: bool,
    stdout: String,
    stderr: String,
}

fn step_error(step: &StepNode, message: impl Into<String>) -> PipelineError {
    PipelineError::StepFailed {
        task: step.task.clone(),
        step: step.id.clone(),
        message: message.into(),
    }
}

async fn run_command(step: &StepNode, command: &str, env: &RunEnv) -> Result<CommandOutput> {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);
    cmd.current_dir(match step.option_str("cwd") {
        Some(dir) => env.resolve(dir),
        None => env.base_dir.clone(),
    });
    cmd.env("SITEPIPE_MODE", &env.mode);
    cmd.env("SITEPIPE_RUN_ID", &env.run_id);
    if let Some(Value::Object(vars)) = step.option("env") {
        for (key, value) in vars {
            match value {
                Value::String(s) => cmd.env(key, s),
                other => cmd.env(key, other.to_string()),
            };
        }
    }

    let child = cmd
        .spawn()
        .map_err(|e| step_error(step, format!("failed to spawn command: {e}")))?;

    let timeout = Duration::from_secs(step.option_u64("timeoutSecs").unwrap_or(DEFAULT_TIMEOUT_SECS));
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| PipelineError::CommandTimeout {
            timeout_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| step_error(step, format!("command execution failed: {e}")))?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

// ---------------------------------------------------------------------------
// Warning baseline
// ---------------------------------------------------------------------------

/// Collapse volatile parts of a warning line so it can be compared across runs.
pub fn normalize_warning(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_digits = false;
    for c in line.trim().chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('N');
            }
            in_digits = true;
        } else {
            in_digits = false;
            out.push(c);
        }
    }
    out
}

fn collect_warnings(pattern: &Regex, output: &CommandOutput) -> BTreeSet<String> {
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .filter(|line| pattern.is_match(line))
        .map(normalize_warning)
        .filter(|w| !w.is_empty())
        .collect()
}

async fn read_baseline(path: &Path) -> Result<BTreeSet<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    tokio::fs::write(path, text).await?;
    Ok(())
}

/// Compare warnings against the baseline file. Returns a summary line.
async fn check_warnings(
    step: &StepNode,
    env: &RunEnv,
    output: &CommandOutput,
    updates: &mut ContextUpdate,
) -> Result<Option<String>> {
    let Some(raw_pattern) = step.option_str("warningPattern") else {
        return Ok(None);
    };
    let pattern = Regex::new(raw_pattern)
        .map_err(|e| step_error(step, format!("invalid warningPattern: {e}")))?;
    let warnings = collect_warnings(&pattern, output);
    updates
        .values
        .insert(format!("{}.warnings", step.id), json!(warnings.len()));

    let baseline_path = step.option_str("baseline").map(|p| env.resolve(p));

    if step.option_bool("updateBaseline").unwrap_or(false) {
        let path = baseline_path
            .ok_or_else(|| step_error(step, "updateBaseline requires 'baseline'"))?;
        write_json(&path, &warnings).await?;
        tracing::info!(step = %step.id, warnings = warnings.len(), baseline = %path.display(), "Warning baseline updated");
        return Ok(Some(format!("baseline updated with {} warnings", warnings.len())));
    }

    let known = match &baseline_path {
        Some(path) => read_baseline(path).await?,
        None => BTreeSet::new(),
    };
    let new: Vec<&String> = warnings.difference(&known).collect();
    if !new.is_empty() {
        return Err(PipelineError::PolicyFailure {
            step: step.id.clone(),
            message: format!("{} new warning(s), first: {}", new.len(), new[0]),
        });
    }
    Ok(Some(format!("{} known warnings, none new", warnings.len())))
}

// ---------------------------------------------------------------------------
// Build output tracking
// ---------------------------------------------------------------------------

async fn collect_modified(dir: &Path, since: SystemTime, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = read_dir.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            Box::pin(collect_modified(&entry.path(), since, files)).await?;
        } else if meta.modified().map(|m| m >= since).unwrap_or(true) {
            files.push(entry.path());
        }
    }
    Ok(())
}

/// Now, rounded down to the second, so coarse filesystem timestamps still
/// compare as "during the step".
fn step_start() -> SystemTime {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

#[async_trait]
impl StepHandler for ExecHandler {
    fn task_type(&self) -> &str {
        match self.kind {
            ExecKind::Exec => "exec",
            ExecKind::Build => "build",
        }
    }

    async fn execute(&self, step: &StepNode, _ctx: &BuildContext, env: &RunEnv) -> Result<Outcome> {
        let command = step
            .option_str("command")
            .ok_or_else(|| step_error(step, "missing 'command'"))?;
        let out_dir = match self.kind {
            ExecKind::Build => Some(env.resolve(
                step.option_str("out")
                    .ok_or_else(|| step_error(step, "missing 'out'"))?,
            )),
            ExecKind::Exec => None,
        };

        tracing::info!(step = %step.id, task = %step.task, command = %command, "Running command");
        let started = step_start();
        let output = run_command(step, command, env).await?;
        tracing::debug!(
            step = %step.id,
            exit_code = output.exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Command finished"
        );

        if !output.success {
            let detail = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            let detail = truncate_output(detail.trim(), MAX_CAPTURED_CHARS);
            return Ok(Outcome::fail(format!(
                "command exited with status {}: {}",
                output.exit_code, detail
            )));
        }

        let mut updates = ContextUpdate::default();
        updates
            .values
            .insert(format!("{}.exitCode", step.id), json!(output.exit_code));
        let warning_summary = check_warnings(step, env, &output, &mut updates).await?;

        let mut message = format!("`{command}` succeeded");
        if let Some(dir) = out_dir {
            let mut files = Vec::new();
            collect_modified(&dir, started, &mut files).await?;
            files.sort();
            message = format!("{message}, {} files updated in {}", files.len(), dir.display());
            updates.output_dir = Some(dir);
            updates.updated_files = Some(files);
        }
        if let Some(summary) = warning_summary {
            message = format!("{message} ({summary})");
        }

        Ok(Outcome::success(message).with_updates(updates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StepGraph;
    use serde_json::json;

    fn step(raw: Value) -> StepNode {
        StepGraph::from_steps(&[raw], PathBuf::from("p.json"), PathBuf::from("."))
            .unwrap()
            .steps()[0]
            .clone()
    }

    fn env(dir: &Path) -> RunEnv {
        RunEnv::new(dir, "default")
    }

    #[test]
    fn normalization_collapses_digit_runs() {
        assert_eq!(
            normalize_warning("  warn: src/a.md:120:7 unused image 3 times "),
            "warn: src/a.md:N:N unused image N times"
        );
    }

    #[tokio::test]
    async fn successful_command() {
        let dir = tempfile::tempdir().unwrap();
        let s = step(json!({"task": "exec", "id": "hello", "command": "echo hi"}));
        let outcome = ExecHandler::exec()
            .execute(&s, &BuildContext::new(), &env(dir.path()))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.context_updates.values["hello.exitCode"], json!(0));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let s = step(json!({"task": "exec", "command": "echo broken >&2; exit 3"}));
        let outcome = ExecHandler::exec()
            .execute(&s, &BuildContext::new(), &env(dir.path()))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.message.contains("status 3"));
        assert!(outcome.message.contains("broken"));
    }

    #[tokio::test]
    async fn timeout_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let s = step(json!({"task": "exec", "command": "sleep 5", "timeoutSecs": 0}));
        let err = ExecHandler::exec()
            .execute(&s, &BuildContext::new(), &env(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CommandTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_command_is_step_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = step(json!({"task": "exec"}));
        let err = ExecHandler::exec()
            .execute(&s, &BuildContext::new(), &env(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { .. }));
    }

    #[tokio::test]
    async fn build_records_output_and_updated_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = step(json!({
            "task": "build",
            "command": "mkdir -p dist/posts && echo a > dist/index.html && echo b > dist/posts/one.html",
            "out": "dist"
        }));
        let outcome = ExecHandler::build()
            .execute(&s, &BuildContext::new(), &env(dir.path()))
            .await
            .unwrap();
        assert!(outcome.is_success(), "{}", outcome.message);
        let updates = outcome.context_updates;
        assert_eq!(updates.output_dir, Some(dir.path().join("dist")));
        let files = updates.updated_files.unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("dist/index.html"), dir.path().join("dist/posts/one.html")]
        );
    }

    #[tokio::test]
    async fn warning_baseline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let run_env = env(dir.path());
        let emit = "echo 'WARN page 12 missing alt'; echo 'ok line'";

        let update = step(json!({
            "task": "exec",
            "command": emit,
            "warningPattern": "^WARN",
            "baseline": "baselines/warn.json",
            "updateBaseline": true
        }));
        ExecHandler::exec()
            .execute(&update, &BuildContext::new(), &run_env)
            .await
            .unwrap();
        let saved: Vec<String> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("baselines/warn.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved, vec!["WARN page N missing alt"]);

        // Same warning with a different number is still known.
        let known = step(json!({
            "task": "exec",
            "command": "echo 'WARN page 40 missing alt'",
            "warningPattern": "^WARN",
            "baseline": "baselines/warn.json"
        }));
        let outcome = ExecHandler::exec()
            .execute(&known, &BuildContext::new(), &run_env)
            .await
            .unwrap();
        assert!(outcome.is_success());

        let fresh = step(json!({
            "task": "exec",
            "command": "echo 'WARN broken link'",
            "warningPattern": "^WARN",
            "baseline": "baselines/warn.json"
        }));
        let err = ExecHandler::exec()
            .execute(&fresh, &BuildContext::new(), &run_env)
            .await
            .unwrap_err();
        match err {
            PipelineError::PolicyFailure { message, .. } => {
                assert!(message.contains("WARN broken link"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
