//! # Execution Strategies
//!
//! How an operation's result is delivered to its caller and how failures are
//! retried. Every call in the runtime, foreground or background, flows
//! through [`CallRunner::invoke`]: it wraps the attempt in a
//! [`ResponseHandle`], drives retries against a fixed deadline, and resolves
//! the handle exactly once.
//!
//! The strategies are a closed set selected at client construction: one
//! operation table, no per-call-site dispatch.
//!
//! - [`ExecutionStrategy::Blocking`]: `invoke` drives every attempt before
//!   returning; the handle is already resolved, and terminal errors surface
//!   as `Err` the moment the caller waits.
//! - [`ExecutionStrategy::Deferred`]: `invoke` spawns the attempt loop and
//!   returns at once; the caller picks the outcome up later as a
//!   [`CallOutcome`] value.
//! - [`ExecutionStrategy::Future`]: same spawn semantics, but the handle is
//!   consumed as a plain `Future` that yields `Result` on access, composing
//!   with the tokio/futures ecosystem.

pub mod handle;
pub mod retry;

pub use handle::{CallOutcome, ResponseHandle};
pub use retry::RetryPolicy;

use crate::errors::{ClientError, Result};
use crate::transport::CallDescriptor;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;

/// Result-delivery flavor, selected per client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Drive all attempts inside `invoke`; the caller suspends for the
    /// whole call and gets `Err` on terminal failure.
    Blocking,

    /// Return immediately; the outcome is observed later as a value.
    Deferred,

    /// Return immediately; the handle is awaited as a standard future.
    Future,
}

impl ExecutionStrategy {
    /// Name as accepted by configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Blocking => "blocking",
            ExecutionStrategy::Deferred => "deferred",
            ExecutionStrategy::Future => "future",
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blocking" => Ok(ExecutionStrategy::Blocking),
            "deferred" => Ok(ExecutionStrategy::Deferred),
            "future" => Ok(ExecutionStrategy::Future),
            other => Err(ClientError::config(format!(
                "Unknown execution strategy '{}' (expected blocking, deferred or future)",
                other
            ))),
        }
    }
}

/// Drives calls according to the configured strategy and retry policy.
///
/// Per-call state (attempt closure, start time, deadline, handle) lives on
/// the stack of whichever task drives the attempts; the runner itself is
/// immutable and shared.
#[derive(Debug, Clone, Copy)]
pub struct CallRunner {
    strategy: ExecutionStrategy,
    retry: RetryPolicy,
}

impl CallRunner {
    /// Create a runner.
    pub fn new(strategy: ExecutionStrategy, retry: RetryPolicy) -> Self {
        Self { strategy, retry }
    }

    /// The configured strategy.
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// The configured retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Wrap one call in a handle and drive its attempts.
    ///
    /// `attempt` performs a single try (receiving the 1-based attempt
    /// number) and reports its outcome; the runner owns classification of
    /// that outcome into resolve-now versus retry-later.
    pub async fn invoke<T, F, Fut>(
        &self,
        descriptor: &CallDescriptor,
        attempt: F,
    ) -> ResponseHandle<T>
    where
        T: Send + 'static,
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (resolver, response) = handle::channel(descriptor.operation.clone());
        let operation = descriptor.operation.clone();
        let policy = self.retry;

        match self.strategy {
            ExecutionStrategy::Blocking => {
                let outcome = retry::run_with_retries(&operation, policy, attempt).await;
                resolver.resolve(outcome);
            }
            ExecutionStrategy::Deferred | ExecutionStrategy::Future => {
                tokio::spawn(async move {
                    let outcome = retry::run_with_retries(&operation, policy, attempt).await;
                    resolver.resolve(outcome);
                });
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn runner(strategy: ExecutionStrategy) -> CallRunner {
        CallRunner::new(
            strategy,
            RetryPolicy {
                max_retry_duration: Duration::from_secs(5),
                retry_interval: Duration::from_millis(100),
            },
        )
    }

    fn descriptor() -> CallDescriptor {
        CallDescriptor::new("test.op", Method::Get, "v1/test")
    }

    #[tokio::test]
    async fn test_blocking_handle_is_resolved_on_return() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let handle = runner(ExecutionStrategy::Blocking)
            .invoke(&descriptor(), move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(11u32)
                }
            })
            .await;

        // The attempt already ran inside invoke.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.wait().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_deferred_outcome_is_a_value() {
        let handle = runner(ExecutionStrategy::Deferred)
            .invoke(&descriptor(), |_| async {
                Err::<u32, _>(ClientError::permission_denied("v1/test"))
            })
            .await;

        let outcome = handle.outcome().await;
        assert!(matches!(outcome.err(), Some(ClientError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_future_strategy_composes() {
        use futures::FutureExt;

        let handle = runner(ExecutionStrategy::Future)
            .invoke(&descriptor(), |_| async { Ok(21u32) })
            .await;

        let doubled = handle.map(|value| value.map(|v| v * 2)).await;
        assert_eq!(doubled.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_strategies_retry_off_the_calling_task() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let handle = runner(ExecutionStrategy::Future)
            .invoke(&descriptor(), move |n| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Err(ClientError::server(500, "flaky"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        // invoke returned before the retries finished.
        assert!(attempts.load(Ordering::SeqCst) <= 1);
        assert_eq!(handle.wait().await.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("blocking".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Blocking);
        assert_eq!("deferred".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Deferred);
        assert_eq!("future".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Future);
        assert!("threads".parse::<ExecutionStrategy>().is_err());
    }
}
