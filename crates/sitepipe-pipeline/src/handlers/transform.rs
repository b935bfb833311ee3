use async_trait::async_trait;
use serde_json::{json, Value};
use sitepipe_transform::{apply_operations, TransformReport};
use sitepipe_types::{BuildContext, ContextUpdate, Outcome, PipelineError, Result};

use crate::graph::StepNode;
use crate::handler::{RunEnv, StepHandler};

// ---------------------------------------------------------------------------
// TransformHandler: JSON tree transform step
// ---------------------------------------------------------------------------

/// Reads `input`, applies `operations`, and writes the result to `out`.
///
/// Options: `input`, `out`, `operations`, `strict` (default true), `pretty`
/// (default true), `report` (optional report path), `allowPartial`.
pub struct TransformHandler;

fn option_error(step: &StepNode, message: impl Into<String>) -> PipelineError {
    PipelineError::StepFailed {
        task: step.task.clone(),
        step: step.id.clone(),
        message: message.into(),
    }
}

async fn write_text(path: &std::path::Path, text: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text).await?;
    Ok(())
}

fn render(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    let mut text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    text.push('\n');
    Ok(text)
}

#[async_trait]
impl StepHandler for TransformHandler {
    fn task_type(&self) -> &str {
        "transform"
    }

    async fn execute(&self, step: &StepNode, _ctx: &BuildContext, env: &RunEnv) -> Result<Outcome> {
        let input = step
            .option_str("input")
            .ok_or_else(|| option_error(step, "missing 'input'"))?;
        let out = step
            .option_str("out")
            .ok_or_else(|| option_error(step, "missing 'out'"))?;
        let operations = step
            .option("operations")
            .and_then(Value::as_array)
            .ok_or_else(|| option_error(step, "'operations' must be an array"))?;
        let strict = step.option_bool("strict").unwrap_or(true);
        let pretty = step.option_bool("pretty").unwrap_or(true);
        let allow_partial = step.option_bool("allowPartial").unwrap_or(false);

        let input_path = env.resolve(input);
        let out_path = env.resolve(out);

        let text = tokio::fs::read_to_string(&input_path)
            .await
            .map_err(|e| option_error(step, format!("cannot read {}: {e}", input_path.display())))?;
        let mut doc: Value = serde_json::from_str(&text)
            .map_err(|e| option_error(step, format!("{} is not valid JSON: {e}", input_path.display())))?;

        // Strict failures surface as TransformError and abort the step.
        let report: TransformReport = apply_operations(&mut doc, operations, strict)?;
        tracing::info!(
            step = %step.id,
            applied = report.applied,
            failed = report.failed,
            out = %out_path.display(),
            "Transform applied"
        );

        write_text(&out_path, render(&doc, pretty)?).await?;

        if let Some(report_path) = step.option_str("report") {
            let report_path = env.resolve(report_path);
            let body = json!({
                "generatedAt": chrono::Utc::now().to_rfc3339(),
                "input": input_path.display().to_string(),
                "out": out_path.display().to_string(),
                "strict": strict,
                "applied": report.applied,
                "failed": report.failed,
                "operations": report.operations,
            });
            write_text(&report_path, render(&body, true)?).await?;
        }

        // The updated-file list belongs to the last build step; publish `out` as a value.
        let mut updates = ContextUpdate::default();
        updates.values.insert(
            format!("{}.out", step.id),
            json!(out_path.display().to_string()),
        );
        updates.values.insert(
            format!("{}.operations", step.id),
            json!({"applied": report.applied, "failed": report.failed}),
        );

        if !report.is_success() {
            let first = report
                .first_error()
                .and_then(|r| r.error.clone())
                .unwrap_or_default();
            let message = format!(
                "{} of {} operations failed; first: {first}",
                report.failed,
                report.operations.len()
            );
            if !allow_partial {
                return Ok(Outcome::fail(message).with_updates(updates));
            }
            return Ok(Outcome::success(format!("partial: {message}")).with_updates(updates));
        }

        Ok(Outcome::success(format!(
            "{} operations applied, wrote {}",
            report.applied,
            out_path.display()
        ))
        .with_updates(updates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StepGraph;
    use sitepipe_types::TransformError;
    use std::path::PathBuf;

    fn step(raw: Value) -> StepNode {
        StepGraph::from_steps(&[raw], PathBuf::from("p.json"), PathBuf::from("."))
            .unwrap()
            .steps()[0]
            .clone()
    }

    fn setup(doc: Value) -> (tempfile::TempDir, RunEnv) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.json"), doc.to_string()).unwrap();
        let env = RunEnv::new(dir.path(), "default");
        (dir, env)
    }

    fn read(path: PathBuf) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn writes_transformed_output_and_report() {
        let (dir, env) = setup(json!({"name": "n"}));
        let s = step(json!({
            "task": "transform",
            "id": "manifest",
            "input": "in.json",
            "out": "build/out.json",
            "report": "reports/transform.json",
            "operations": [{"op": "set", "path": "meta.version", "value": "1.0"}]
        }));
        let outcome = TransformHandler
            .execute(&s, &BuildContext::new(), &env)
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(
            read(dir.path().join("build/out.json")),
            json!({"name": "n", "meta": {"version": "1.0"}})
        );
        assert_eq!(outcome.context_updates.updated_files, None);
        assert_eq!(
            outcome.context_updates.values["manifest.out"],
            json!(dir.path().join("build/out.json").display().to_string())
        );

        let report = read(dir.path().join("reports/transform.json"));
        assert_eq!(report["applied"], 1);
        assert_eq!(report["operations"][0]["targets"], 1);
        assert!(report["generatedAt"].is_string());
    }

    #[tokio::test]
    async fn strict_failure_is_transform_error() {
        let (dir, env) = setup(json!({"items": [1, 2]}));
        let s = step(json!({
            "task": "transform",
            "input": "in.json",
            "out": "out.json",
            "operations": [{"op": "remove", "path": "items[*]", "exactTargets": 3}]
        }));
        let err = TransformHandler
            .execute(&s, &BuildContext::new(), &env)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transform(TransformError::Constraint { actual: 2, .. })
        ));
        assert!(!dir.path().join("out.json").exists());
    }

    #[tokio::test]
    async fn lenient_failure_writes_output_and_fails_unless_partial_allowed() {
        let (dir, env) = setup(json!({"a": 1}));
        let ops = json!([
            {"op": "replace", "path": "missing", "value": 0},
            {"op": "set", "path": "b", "value": 2}
        ]);

        let s = step(json!({
            "task": "transform", "input": "in.json", "out": "out.json",
            "strict": false, "pretty": false, "operations": ops.clone()
        }));
        let outcome = TransformHandler
            .execute(&s, &BuildContext::new(), &env)
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.message.contains("1 of 2 operations failed"));
        let written = std::fs::read_to_string(dir.path().join("out.json")).unwrap();
        assert_eq!(written, "{\"a\":1,\"b\":2}\n");

        let s = step(json!({
            "task": "transform", "input": "in.json", "out": "out.json",
            "strict": false, "allowPartial": true, "operations": ops
        }));
        let outcome = TransformHandler
            .execute(&s, &BuildContext::new(), &env)
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn missing_input_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let env = RunEnv::new(dir.path(), "default");
        let s = step(json!({
            "task": "transform", "input": "nope.json", "out": "o.json", "operations": []
        }));
        let err = TransformHandler
            .execute(&s, &BuildContext::new(), &env)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { .. }));
    }
}
