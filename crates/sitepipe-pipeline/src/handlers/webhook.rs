use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use sitepipe_types::{BuildContext, ContextUpdate, Outcome, PipelineError, Result};

use crate::graph::StepNode;
use crate::handler::{RunEnv, StepHandler};
use crate::truncation::truncate_message;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

// ---------------------------------------------------------------------------
// WebhookHandler: JSON POST to an external service
// ---------------------------------------------------------------------------

/// POSTs `body` to `url`. Used for cache purges and URL-submission pings.
///
/// `${VAR}` in `url` and `headers` values is replaced from the process
/// environment so tokens stay out of the pipeline document. Connection
/// errors, 429, and 5xx responses are retryable transport errors.
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl Default for WebhookHandler {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

fn step_error(step: &StepNode, message: impl Into<String>) -> PipelineError {
    PipelineError::StepFailed {
        task: step.task.clone(),
        step: step.id.clone(),
        message: message.into(),
    }
}

/// Replace `${VAR}` with the value of environment variable `VAR`.
pub fn expand_env(input: &str) -> std::result::Result<String, String> {
    let mut missing = None;
    let expanded = ENV_VAR.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(format!("environment variable '{name}' is not set")),
        None => Ok(expanded.into_owned()),
    }
}

/// Whether an HTTP status should be retried.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

#[async_trait]
impl StepHandler for WebhookHandler {
    fn task_type(&self) -> &str {
        "webhook"
    }

    fn default_retries(&self) -> usize {
        2
    }

    async fn execute(&self, step: &StepNode, _ctx: &BuildContext, env: &RunEnv) -> Result<Outcome> {
        let raw_url = step
            .option_str("url")
            .ok_or_else(|| step_error(step, "missing 'url'"))?;
        let url = expand_env(raw_url).map_err(|e| step_error(step, e))?;
        let timeout = Duration::from_secs(step.option_u64("timeoutSecs").unwrap_or(DEFAULT_TIMEOUT_SECS));
        let body = step.option("body").cloned().unwrap_or_else(|| json!({}));

        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("x-sitepipe-run", &env.run_id)
            .json(&body);
        if let Some(Value::Object(headers)) = step.option("headers") {
            for (name, value) in headers {
                let value = value
                    .as_str()
                    .ok_or_else(|| step_error(step, format!("header '{name}' must be a string")))?;
                let value = expand_env(value).map_err(|e| step_error(step, e))?;
                request = request.header(name.as_str(), value);
            }
        }

        tracing::info!(step = %step.id, url = %raw_url, "Sending webhook");
        let response = request.send().await.map_err(|e| PipelineError::Transport {
            target: raw_url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(step = %step.id, status = status.as_u16(), body_len = text.len(), "Webhook responded");

        if is_retryable_status(status.as_u16()) {
            return Err(PipelineError::Transport {
                target: raw_url.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), truncate_message(&text, 200)),
            });
        }

        let mut updates = ContextUpdate::default();
        updates
            .values
            .insert(format!("{}.status", step.id), json!(status.as_u16()));

        if !status.is_success() {
            return Ok(Outcome::fail(format!(
                "HTTP {} from {raw_url}: {}",
                status.as_u16(),
                truncate_message(&text, 200)
            ))
            .with_updates(updates));
        }

        Ok(Outcome::success(format!("HTTP {} from {raw_url}", status.as_u16())).with_updates(updates))
    }
}
