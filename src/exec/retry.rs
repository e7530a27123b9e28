//! Retry driver shared by foreground calls and background maintenance.
//!
//! Each call gets a fixed deadline (`started_at + max_retry_duration`).
//! Retryable failures re-attempt after `retry_interval` as long as the next
//! attempt would still start inside the deadline; terminal failures and
//! exhausted deadlines resolve immediately. Whether an error is retryable is
//! decided solely by [`crate::errors::ClientError::is_retryable`].

use crate::config::ClientConfig;
use crate::errors::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Per-call retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total wall-clock budget for all attempts of one call.
    pub max_retry_duration: Duration,

    /// Delay between the end of one attempt and the start of the next.
    pub retry_interval: Duration,
}

impl RetryPolicy {
    /// Build the policy from client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retry_duration: config.max_retry_duration(),
            retry_interval: config.retry_interval(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_config(&ClientConfig::default())
    }
}

/// Run `attempt` until it succeeds, fails terminally, or the deadline would
/// be crossed by the next attempt.
///
/// The closure receives the 1-based attempt number. Sleeping between
/// attempts suspends only this task; callers that must not block simply run
/// this on a spawned task.
pub(crate) async fn run_with_retries<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    attempt: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started_at = Instant::now();
    let deadline = started_at + policy.max_retry_duration;
    let mut attempt_no: u32 = 1;

    loop {
        match attempt(attempt_no).await {
            Ok(value) => {
                if attempt_no > 1 {
                    tracing::debug!(
                        operation = %operation,
                        attempts = attempt_no,
                        "Call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && Instant::now() + policy.retry_interval < deadline => {
                tracing::warn!(
                    operation = %operation,
                    attempt = attempt_no,
                    error = %error,
                    retry_in_ms = policy.retry_interval.as_millis() as u64,
                    "Retryable failure, scheduling another attempt"
                );
                tokio::time::sleep(policy.retry_interval).await;
                attempt_no += 1;
            }
            Err(error) => {
                if error.is_retryable() {
                    tracing::warn!(
                        operation = %operation,
                        attempts = attempt_no,
                        error = %error,
                        "Retry budget exhausted"
                    );
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(budget_ms: u64, interval_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retry_duration: Duration::from_millis(budget_ms),
            retry_interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_means_exactly_one_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<u32> = run_with_retries("test.op", policy(10_000, 100), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::not_found("v1/none"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_retries_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = run_with_retries("test.op", policy(10_000, 100), move |n| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(ClientError::server(503, "unavailable"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_starts_after_the_deadline() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        // Budget of 1s with 300ms between attempts: attempts start at
        // 0ms, 300ms, 600ms, 900ms; the next would start at 1200ms, past
        // the deadline.
        let started = Instant::now();
        let result: Result<u32> = run_with_retries("test.op", policy(1_000, 300), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::network("connection refused"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_past_deadline_is_returned_as_is() {
        let result: Result<u32> = run_with_retries("test.op", policy(100, 200), |_| async {
            Err(ClientError::rate_limited(None))
        })
        .await;

        assert!(matches!(result.unwrap_err(), ClientError::RateLimited { .. }));
    }
}
