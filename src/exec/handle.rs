//! Single-assignment response handles.
//!
//! A [`ResponseHandle`] is created per call and resolved exactly once, either
//! with a value or with a terminal error. The write side ([`Resolver`]) lives
//! with whoever drives the attempts; resolving a handle twice is a logged
//! no-op, never a double delivery.

use crate::errors::{ClientError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Create a linked resolver/handle pair for one call.
pub(crate) fn channel<T>(operation: impl Into<String>) -> (Resolver<T>, ResponseHandle<T>) {
    let (tx, rx) = oneshot::channel();
    let operation = operation.into();
    (
        Resolver { operation: operation.clone(), tx: Mutex::new(Some(tx)) },
        ResponseHandle { operation, rx },
    )
}

/// Write side of a response handle. Accepts exactly one resolution.
pub(crate) struct Resolver<T> {
    operation: String,
    tx: Mutex<Option<oneshot::Sender<Result<T>>>>,
}

impl<T> Resolver<T> {
    /// Resolve with a success value. Returns false if already resolved.
    pub fn succeed(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with a terminal error. Returns false if already resolved.
    pub fn fail(&self, error: ClientError) -> bool {
        self.resolve(Err(error))
    }

    /// Resolve the handle. The first resolution wins; later ones are
    /// dropped with a debug log.
    pub fn resolve(&self, outcome: Result<T>) -> bool {
        let sender = self.tx.lock().expect("resolver lock poisoned").take();
        match sender {
            Some(tx) => {
                // The receiver may already have been dropped (a deferred
                // caller that stopped waiting); the attempt still counts as
                // resolved.
                let _ = tx.send(outcome);
                true
            }
            None => {
                tracing::debug!(
                    operation = %self.operation,
                    "Ignoring second resolution of an already-resolved handle"
                );
                false
            }
        }
    }
}

/// The outcome of a call, delivered as a plain value.
///
/// This is how the deferred execution strategy reports terminal errors:
/// inspectable data, not an `Err` to propagate. [`CallOutcome::into_result`]
/// is the explicit conversion for callers who do want `?` semantics.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// The call succeeded.
    Success(T),
    /// The call failed terminally (after any retries).
    Failed(ClientError),
}

impl<T> CallOutcome<T> {
    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// The error, if the call failed.
    pub fn err(&self) -> Option<&ClientError> {
        match self {
            CallOutcome::Success(_) => None,
            CallOutcome::Failed(e) => Some(e),
        }
    }

    /// Convert into a `Result`, turning a failure back into an `Err`.
    pub fn into_result(self) -> Result<T> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::Failed(error) => Err(error),
        }
    }
}

/// Read side of one call: a value that becomes available later, exactly once.
///
/// The handle is consumed by whichever wait style the caller picks:
///
/// - [`ResponseHandle::wait`]: suspend until resolution, `Err` on terminal
///   failure (the blocking strategy returns handles that are already
///   resolved, so this returns immediately)
/// - [`ResponseHandle::outcome`]: suspend until resolution, failure as a
///   [`CallOutcome`] value (deferred strategy)
/// - `.await`: the handle is itself a `Future`, composable with the
///   tokio/futures ecosystem (future strategy)
/// - [`ResponseHandle::wait_timeout`]: like `wait`, but gives up after a
///   timeout and returns `None` instead of blocking forever. The underlying
///   attempt keeps running to completion or deadline regardless.
#[derive(Debug)]
pub struct ResponseHandle<T> {
    operation: String,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> ResponseHandle<T> {
    /// Operation name this handle belongs to.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Suspend until the call resolves; terminal errors propagate as `Err`.
    pub async fn wait(self) -> Result<T> {
        self.await
    }

    /// Suspend until the call resolves; deliver the outcome as a value.
    pub async fn outcome(self) -> CallOutcome<T> {
        match self.await {
            Ok(value) => CallOutcome::Success(value),
            Err(error) => CallOutcome::Failed(error),
        }
    }

    /// Suspend until the call resolves or `timeout` elapses.
    ///
    /// Returns `None` on timeout. This abandons the handle, not the call:
    /// in-flight attempts run to their own deadline regardless of whether
    /// anyone is still waiting.
    pub async fn wait_timeout(self, timeout: Duration) -> Option<Result<T>> {
        tokio::time::timeout(timeout, self).await.ok()
    }
}

impl<T> Future for ResponseHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.as_mut().get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The driving task died without resolving (e.g. runtime
            // shutdown mid-call).
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::internal(format!(
                "call '{}' was abandoned before resolution",
                this.operation
            )))),
        }
    }
}
