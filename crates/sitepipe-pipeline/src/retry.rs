//! Retry logic with configurable backoff for transient step failures.

use std::time::Duration;

use sitepipe_types::{PipelineError, Result};

/// Delay between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    Fixed(Duration),
    None,
}

impl BackoffPolicy {
    /// Policy for a step's `retryDelayMs`; a zero delay retries immediately.
    pub fn for_delay(delay: Duration) -> Self {
        if delay.is_zero() {
            BackoffPolicy::None
        } else {
            BackoffPolicy::Fixed(delay)
        }
    }

    /// Delay before the next attempt.
    pub fn delay(&self) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

/// Call `f` up to `max_retries + 1` times, sleeping between attempts.
///
/// Only errors for which [`PipelineError::is_retryable`] holds are retried.
/// When every attempt fails with a retryable error the last one is wrapped
/// in [`PipelineError::RetriesExhausted`].
pub async fn execute_with_retry<T, F, Fut>(
    f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    step_id: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay();
                tracing::warn!(step = %step_id, attempt, delay_ms = %delay.as_millis(), error = %e, "Retryable error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                return Err(PipelineError::RetriesExhausted {
                    step: step_id.to_string(),
                    attempts: attempt + 1,
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn transport() -> PipelineError {
        PipelineError::Transport {
            target: "https://example.test/purge".into(),
            message: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn success_on_first_try() {
        let result = execute_with_retry(|| async { Ok(7) }, 3, &BackoffPolicy::None, "a").await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retryable_error_then_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result = execute_with_retry(
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(transport())
                    } else {
                        Ok("ok")
                    }
                }
            },
            3,
            &BackoffPolicy::None,
            "purge",
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_is_reclassified() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<()> = execute_with_retry(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(transport())
                }
            },
            2,
            &BackoffPolicy::None,
            "purge",
        )
        .await;
        match result.unwrap_err() {
            PipelineError::RetriesExhausted { step, attempts, message } => {
                assert_eq!(step, "purge");
                assert_eq!(attempts, 3);
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_still_reclassifies() {
        let result: Result<()> =
            execute_with_retry(|| async { Err(transport()) }, 0, &BackoffPolicy::None, "p").await;
        assert!(matches!(
            result.unwrap_err(),
            PipelineError::RetriesExhausted { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<()> = execute_with_retry(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(PipelineError::PolicyFailure {
                        step: "lint".into(),
                        message: "new warnings".into(),
                    })
                }
            },
            5,
            &BackoffPolicy::None,
            "lint",
        )
        .await;
        assert!(matches!(result.unwrap_err(), PipelineError::PolicyFailure { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn step_delay_selects_policy() {
        let fixed = BackoffPolicy::for_delay(Duration::from_millis(200));
        assert_eq!(fixed, BackoffPolicy::Fixed(Duration::from_millis(200)));
        assert_eq!(fixed.delay(), Duration::from_millis(200));

        let immediate = BackoffPolicy::for_delay(Duration::ZERO);
        assert_eq!(immediate, BackoffPolicy::None);
        assert_eq!(immediate.delay(), Duration::ZERO);
    }
}
