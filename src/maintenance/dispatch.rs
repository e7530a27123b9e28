//! Callback dispatch off the scheduler loop.
//!
//! User lifecycle callbacks run on an execution context of their own: a
//! dispatcher task drains a dedicated queue and hands each callback to the
//! blocking pool (or to a caller-supplied runtime). A slow, blocking, or
//! panicking callback can therefore never stall a scan tick or delay
//! renewal of other leases.

use crate::errors::ClientError;
use crate::lease::LeaseRecord;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Depth of the callback queue; beyond this, callbacks are dropped with a
/// warning rather than applying backpressure to the scheduler.
const CALLBACK_QUEUE_DEPTH: usize = 256;

struct CallbackJob {
    label: &'static str,
    key: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

/// Hands lease lifecycle callbacks to their own execution context.
#[derive(Clone)]
pub struct CallbackDispatcher {
    tx: mpsc::Sender<CallbackJob>,
}

impl CallbackDispatcher {
    /// Start the dispatcher task.
    ///
    /// Callbacks run on `executor`'s blocking pool when provided, otherwise
    /// on the ambient runtime's blocking pool. The task exits when `cancel`
    /// fires or every sender is gone.
    pub fn start(executor: Option<tokio::runtime::Handle>, cancel: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::channel::<CallbackJob>(CALLBACK_QUEUE_DEPTH);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => run_callback(executor.as_ref(), job),
                        None => break,
                    },
                }
            }
            tracing::debug!("Callback dispatcher stopped");
        });

        Self { tx }
    }

    /// Dispatch the on-renew callback, if one is set.
    pub fn renewed(&self, record: &LeaseRecord) {
        if let Some(callback) = record.callbacks.on_renew.clone() {
            let record = record.clone();
            self.submit("on_renew", record.key.clone(), Box::new(move || callback(&record)));
        }
    }

    /// Dispatch the on-rotate callback, if one is set.
    pub fn rotated(&self, record: &LeaseRecord) {
        if let Some(callback) = record.callbacks.on_rotate.clone() {
            let record = record.clone();
            self.submit("on_rotate", record.key.clone(), Box::new(move || callback(&record)));
        }
    }

    /// Dispatch the on-error callback, if one is set, with the terminal
    /// error and the stale record.
    pub fn errored(&self, error: ClientError, record: &LeaseRecord) {
        if let Some(callback) = record.callbacks.on_error.clone() {
            let record = record.clone();
            self.submit(
                "on_error",
                record.key.clone(),
                Box::new(move || callback(&error, &record)),
            );
        }
    }

    fn submit(&self, label: &'static str, key: String, run: Box<dyn FnOnce() + Send + 'static>) {
        let job = CallbackJob { label, key, run };
        if let Err(err) = self.tx.try_send(job) {
            let job = match err {
                mpsc::error::TrySendError::Full(job) => job,
                mpsc::error::TrySendError::Closed(job) => job,
            };
            tracing::warn!(
                key = %job.key,
                callback = job.label,
                "Dropping lease callback, dispatcher queue unavailable"
            );
        }
    }
}

/// Run one callback on the blocking pool, supervised so a panic is logged
/// instead of propagating anywhere.
fn run_callback(executor: Option<&tokio::runtime::Handle>, job: CallbackJob) {
    let CallbackJob { label, key, run } = job;
    let joined = match executor {
        Some(handle) => handle.spawn_blocking(run),
        None => tokio::task::spawn_blocking(run),
    };

    tokio::spawn(async move {
        if let Err(join_error) = joined.await {
            if join_error.is_panic() {
                tracing::error!(key = %key, callback = label, "Lease callback panicked");
            }
        }
    });
}
