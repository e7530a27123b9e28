//! Periodic lease maintenance.
//!
//! One scan loop wakes every `check_period`, walks a snapshot of the lease
//! cache, and claims every record that has entered its jittered renewal
//! window. Claimed records are pushed onto a work queue drained by a small
//! worker pool that issues the actual renew/rotate calls, so a slow server
//! round trip never delays the scan itself. Claiming flips the record to
//! `RenewalPending`/`Rotating` under the cache's per-key lock, which is what
//! guarantees at most one in-flight maintenance operation per key.
//!
//! Per-lease failures are isolated: a lease that cannot be kept alive is
//! dropped and reported through its own `on_error` callback; the loops keep
//! ticking for everything else.

use crate::errors::{ClientError, Result};
use crate::exec::retry::{run_with_retries, RetryPolicy};
use crate::lease::{LeaseCache, LeaseRecord, LeaseState};
use crate::observability::MetricsRecorder;
use crate::transport::{LeaseInfo, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::dispatch::CallbackDispatcher;

/// Depth of the renewal job queue. A full queue reverts the claim so the
/// next tick retries, rather than blocking the scan.
const JOB_QUEUE_DEPTH: usize = 64;

/// Everything a maintenance worker needs to keep one lease alive.
pub(crate) struct MaintenanceContext {
    pub transport: Arc<dyn Transport>,
    pub cache: Arc<LeaseCache>,
    pub dispatcher: CallbackDispatcher,
    pub retry: RetryPolicy,
    pub jitter_cap: Duration,
    pub metrics: MetricsRecorder,
}

/// Handle to a running maintenance scheduler.
///
/// Dropping the handle does not stop the loops; call
/// [`MaintenanceHandle::shutdown`] for an orderly stop that lets in-flight
/// attempts finish.
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stop the periodic trigger and wait for the loops to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = futures::future::join_all(self.tasks).await;
        tracing::info!("Maintenance scheduler stopped");
    }
}

/// Start the scan loop and worker pool.
pub(crate) fn start(
    ctx: Arc<MaintenanceContext>,
    check_period: Duration,
    workers: usize,
) -> MaintenanceHandle {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<LeaseRecord>(JOB_QUEUE_DEPTH);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut tasks = Vec::with_capacity(workers + 1);
    tasks.push(tokio::spawn(scan_loop(ctx.clone(), tx, check_period, cancel.clone())));
    for worker_id in 0..workers {
        tasks.push(tokio::spawn(worker_loop(worker_id, ctx.clone(), rx.clone(), cancel.clone())));
    }

    tracing::info!(
        check_period_secs = check_period.as_secs(),
        workers,
        "Maintenance scheduler started"
    );
    MaintenanceHandle { cancel, tasks }
}

async fn scan_loop(
    ctx: Arc<MaintenanceContext>,
    tx: mpsc::Sender<LeaseRecord>,
    check_period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(check_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => scan(&ctx, &tx),
        }
    }
    // tx drops here; workers drain the queue and exit.
}

/// One pass over the cache: drop what is past saving, claim what is due.
fn scan(ctx: &MaintenanceContext, tx: &mpsc::Sender<LeaseRecord>) {
    let now = Instant::now();
    let records = ctx.cache.snapshot();
    ctx.metrics.update_leases_held(records.len());

    for record in records {
        if record.state != LeaseState::Active {
            continue;
        }

        if record.is_expired(now) && record.is_unrecoverable() {
            if ctx.cache.remove_if_unrecoverable(&record.key, now).is_some() {
                ctx.metrics.record_expired_lease();
                tracing::warn!(key = %record.key, "Dropping expired lease with no recovery path");
            }
            continue;
        }

        if !record.is_due(now) {
            continue;
        }

        let Some(claimed) = ctx.cache.begin_maintenance(&record.key) else {
            continue;
        };

        if let Err(err) = tx.try_send(claimed) {
            let claimed = match err {
                mpsc::error::TrySendError::Full(rec) => rec,
                mpsc::error::TrySendError::Closed(rec) => rec,
            };
            // Give the claim back so the next tick can retry.
            ctx.cache.transition(&claimed.key, claimed.state, LeaseState::Active);
            tracing::warn!(key = %claimed.key, "Maintenance queue full, deferring lease to next tick");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<MaintenanceContext>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<LeaseRecord>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        match job {
            Some(record) => maintain_lease(&ctx, record).await,
            None => break,
        }
    }
    tracing::debug!(worker_id, "Maintenance worker stopped");
}

/// Drive one claimed record through renew-or-rotate.
async fn maintain_lease(ctx: &MaintenanceContext, record: LeaseRecord) {
    let key = record.key.clone();

    if record.state == LeaseState::RenewalPending {
        match renew(ctx, &record).await {
            Ok(renewed) => {
                ctx.cache.put(renewed.clone());
                ctx.metrics.record_renewal(true);
                tracing::debug!(
                    key = %key,
                    new_duration_secs = renewed.duration.as_secs(),
                    "Lease renewed"
                );
                ctx.dispatcher.renewed(&renewed);
                return;
            }
            Err(error) => {
                ctx.metrics.record_renewal(false);
                if matches!(error, ClientError::LeaseNotRenewable { .. }) {
                    tracing::debug!(key = %key, "Server declined renewal, rotating");
                } else {
                    tracing::warn!(key = %key, error = %error, "Renewal failed, falling back to rotation");
                }
                ctx.cache.transition(&key, LeaseState::RenewalPending, LeaseState::Rotating);
            }
        }
    } else if record.state != LeaseState::Rotating {
        tracing::debug!(key = %key, state = %record.state, "Skipping job for record in unexpected state");
        return;
    }

    match rotate(ctx, &record).await {
        Ok(rotated) => {
            if rotated.key != key {
                ctx.cache.remove(&key);
            }
            ctx.cache.put(rotated.clone());
            ctx.metrics.record_rotation(true);
            tracing::info!(old_key = %key, new_key = %rotated.key, "Lease rotated");
            ctx.dispatcher.rotated(&rotated);
        }
        Err(error) => {
            ctx.metrics.record_rotation(false);
            ctx.cache.remove(&key);
            tracing::error!(key = %key, error = %error, "Rotation failed, lease dropped");
            let stale = record.with_state(LeaseState::Errored);
            let wrapped = ClientError::rotation_failed(&key, error.to_string());
            ctx.dispatcher.errored(wrapped, &stale);
        }
    }
}

/// Replay the record's renewal descriptor and build the replacement record
/// from the fresh grant.
async fn renew(ctx: &MaintenanceContext, record: &LeaseRecord) -> Result<LeaseRecord> {
    let descriptor = record
        .renew_with
        .clone()
        .ok_or_else(|| ClientError::lease_not_renewable(&record.key))?;

    let response =
        run_with_retries(&descriptor.operation, ctx.retry, |_| ctx.transport.send(&descriptor))
            .await
            .map_err(|error| normalize_renewal_error(&record.key, error))?;

    let info = LeaseInfo::from_response(&response).ok_or_else(|| {
        ClientError::invalid_response(format!(
            "Renewal response for '{}' carried no lease metadata",
            record.key
        ))
    })?;

    Ok(record.renewed(&info, ctx.jitter_cap))
}

/// Replay the original read to obtain a fresh lease for the same material.
async fn rotate(ctx: &MaintenanceContext, record: &LeaseRecord) -> Result<LeaseRecord> {
    let descriptor = record
        .rotate_with
        .clone()
        .ok_or_else(|| ClientError::rotation_failed(&record.key, "no rotation source recorded"))?;

    let response =
        run_with_retries(&descriptor.operation, ctx.retry, |_| ctx.transport.send(&descriptor))
            .await?;

    let info = LeaseInfo::from_response(&response);
    let (new_key, duration, renewable) = match &info {
        Some(info) => (
            info.lease_id.clone().unwrap_or_else(|| record.key.clone()),
            info.duration,
            info.renewable,
        ),
        // Leaseless secret under a pseudo-TTL: same key, same nominal
        // duration, still rotate-only.
        None => (record.key.clone(), record.duration, false),
    };

    let mut rotated = LeaseRecord::new(
        new_key,
        response.payload(),
        duration,
        renewable,
        record.renewal_window,
        ctx.jitter_cap,
    )
    .with_callbacks(record.callbacks.clone())
    .with_rotate_descriptor(descriptor);

    // Only a fresh lease id yields a usable renew call. A rotated token's
    // old renew descriptor would renew the discarded token, so grants
    // without a lease id stay rotate-only from here on.
    if renewable {
        if let Some(lease_id) = info.as_ref().and_then(|i| i.lease_id.as_deref()) {
            rotated = rotated.with_renew_descriptor(crate::engines::sys::renew_lease_descriptor(
                lease_id, duration,
            ));
        }
    }

    Ok(rotated)
}

/// Map the server's "lease is not renewable" rejection onto the internal
/// signal that triggers rotation fallback.
fn normalize_renewal_error(key: &str, error: ClientError) -> ClientError {
    match &error {
        ClientError::ClientStatus { status: 400, message }
            if message.contains("not renewable") =>
        {
            ClientError::lease_not_renewable(key)
        }
        _ => error,
    }
}
