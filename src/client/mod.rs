//! # Client Context
//!
//! The explicit context object every operation flows through: transport +
//! lease cache + execution strategy + maintenance lifecycle, with explicit
//! start/stop instead of ambient globals.
//!
//! ```rust,ignore
//! use latchkey::{Client, ClientConfig};
//! use latchkey::engines::kv;
//!
//! let config = ClientConfig::from_env()?;
//! let client = Client::new(config)?;
//! client.start_maintenance();
//!
//! let secret = kv::read(&client, "secret", "app/api-key").await?;
//!
//! client.shutdown().await;
//! ```

use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::exec::{CallRunner, ResponseHandle, RetryPolicy};
use crate::lease::{LeaseCache, LeaseCallbacks, LeaseRecord};
use crate::maintenance::{self, CallbackDispatcher, MaintenanceHandle};
use crate::observability::MetricsRecorder;
use crate::transport::{ApiResponse, CallDescriptor, HttpTransport, LeaseInfo, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options for a lease-producing read.
#[derive(Debug, Clone, Default)]
pub struct LeaseOptions {
    /// Override the configured renewal window for this lease.
    pub renewal_window: Option<Duration>,

    /// Treat a leaseless response as a pseudo-lease with this TTL; the
    /// scheduler then refreshes it by replaying the read.
    pub pseudo_ttl: Option<Duration>,

    /// Cache key override. Required for leases whose response carries no
    /// lease id (tokens, leaseless secrets default to the request path).
    pub cache_key: Option<String>,

    /// Renewal descriptor override (e.g. token renew-self). Defaults to the
    /// generic lease-renew endpoint when the response carries a lease id.
    pub renew_with: Option<CallDescriptor>,

    /// Rotation descriptor override. Defaults to replaying the read itself.
    pub rotate_with: Option<CallDescriptor>,

    /// Lifecycle callbacks for this lease.
    pub callbacks: LeaseCallbacks,
}

impl LeaseOptions {
    /// Options with defaults everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set lifecycle callbacks.
    pub fn with_callbacks(mut self, callbacks: LeaseCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Cache under a pseudo-TTL when the response is leaseless.
    pub fn with_pseudo_ttl(mut self, ttl: Duration) -> Self {
        self.pseudo_ttl = Some(ttl);
        self
    }
}

struct MaintenanceRun {
    handle: MaintenanceHandle,
    dispatcher_cancel: CancellationToken,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<LeaseCache>,
    runner: CallRunner,
    metrics: MetricsRecorder,
    maintenance: Mutex<Option<MaintenanceRun>>,
}

/// Handle to the client runtime. Cheap to clone; all clones share the same
/// cache and maintenance lifecycle.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client over the HTTP transport described by `config`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Config`] if the configuration fails validation
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a custom transport.
    ///
    /// This is the seam both for alternative wire implementations and for
    /// tests that drive the runtime without a network.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let runner =
            CallRunner::new(config.execution_strategy, RetryPolicy::from_config(&config));

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                cache: Arc::new(LeaseCache::new()),
                runner,
                metrics: MetricsRecorder::new(),
                maintenance: Mutex::new(None),
            }),
        })
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The lease cache shared with the maintenance scheduler.
    pub fn cache(&self) -> &LeaseCache {
        &self.inner.cache
    }

    /// Look up a held lease by key.
    pub fn lease(&self, key: &str) -> Option<LeaseRecord> {
        self.inner.cache.get(key)
    }

    /// Issue one operation through the configured execution strategy.
    ///
    /// Retries are driven against the configured deadline; the handle
    /// resolves exactly once. The response is not cached; use
    /// [`Client::invoke_leased`] for reads that produce time-bound material.
    pub async fn invoke(&self, descriptor: CallDescriptor) -> ResponseHandle<ApiResponse> {
        let transport = self.inner.transport.clone();
        let metrics = self.inner.metrics;
        let attempt_descriptor = descriptor.clone();

        self.inner
            .runner
            .invoke(&descriptor, move |_| {
                let transport = transport.clone();
                let descriptor = attempt_descriptor.clone();
                async move {
                    let result = transport.send(&descriptor).await;
                    metrics.record_request(&descriptor.operation, result.is_ok());
                    result
                }
            })
            .await
    }

    /// Issue a lease-producing read; on success the lease record is placed
    /// in the cache before the handle resolves, and the handle resolves with
    /// that record.
    pub async fn invoke_leased(
        &self,
        descriptor: CallDescriptor,
        options: LeaseOptions,
    ) -> ResponseHandle<LeaseRecord> {
        let inner = self.inner.clone();
        let attempt_descriptor = descriptor.clone();

        self.inner
            .runner
            .invoke(&descriptor, move |_| {
                let inner = inner.clone();
                let descriptor = attempt_descriptor.clone();
                let options = options.clone();
                async move {
                    let result = inner.transport.send(&descriptor).await;
                    inner.metrics.record_request(&descriptor.operation, result.is_ok());
                    let response = result?;
                    let record =
                        build_record(&inner.config, &descriptor, &options, &response)?;
                    inner.cache.put(record.clone());
                    Ok(record)
                }
            })
            .await
    }

    /// Construct a lease record from an already-obtained response and hand
    /// it to the cache.
    ///
    /// Most callers want [`Client::invoke_leased`]; this seam exists for
    /// engines that must inspect the response before deciding how the lease
    /// renews (e.g. tokens, whose renew call embeds the issued token).
    pub fn cache_response(
        &self,
        descriptor: &CallDescriptor,
        options: &LeaseOptions,
        response: &ApiResponse,
    ) -> Result<LeaseRecord> {
        let record = build_record(&self.inner.config, descriptor, options, response)?;
        self.inner.cache.put(record.clone());
        Ok(record)
    }

    /// Revoke a lease: tell the server to discard it and drop the local
    /// record. The record is removed even when the server call fails; the
    /// error is still reported.
    pub async fn revoke(&self, key: &str) -> Result<()> {
        let descriptor = crate::engines::sys::revoke_lease_descriptor(key);
        let handle = self.invoke(descriptor).await;
        let result = handle.wait().await;
        self.inner.cache.remove(key);
        result.map(|_| ())
    }

    /// Drop a record from the cache without telling the server anything.
    /// The right way to stop maintaining a pseudo-TTL secret.
    pub fn forget(&self, key: &str) -> Option<LeaseRecord> {
        self.inner.cache.remove(key)
    }

    /// Start the maintenance scheduler. Idempotent while running.
    pub fn start_maintenance(&self) {
        let mut guard = self.inner.maintenance.lock().expect("maintenance lock poisoned");
        if guard.is_some() {
            tracing::warn!("Maintenance scheduler already running");
            return;
        }

        let dispatcher_cancel = CancellationToken::new();
        let dispatcher = CallbackDispatcher::start(
            self.inner.config.callback_executor.clone(),
            dispatcher_cancel.clone(),
        );

        let ctx = Arc::new(maintenance::MaintenanceContext {
            transport: self.inner.transport.clone(),
            cache: self.inner.cache.clone(),
            dispatcher,
            retry: RetryPolicy::from_config(&self.inner.config),
            jitter_cap: self.inner.config.check_jitter(),
            metrics: self.inner.metrics,
        });

        let handle = maintenance::start(
            ctx,
            self.inner.config.check_period(),
            self.inner.config.maintenance_workers,
        );

        *guard = Some(MaintenanceRun { handle, dispatcher_cancel });
    }

    /// Stop the maintenance scheduler, letting in-flight renew/rotate
    /// attempts finish. The cache and foreground calls keep working; the
    /// scheduler can be started again later.
    pub async fn stop_maintenance(&self) {
        let run = self.inner.maintenance.lock().expect("maintenance lock poisoned").take();
        if let Some(run) = run {
            run.handle.shutdown().await;
            run.dispatcher_cancel.cancel();
        }
    }

    /// Orderly shutdown: stop the scheduler and its callback dispatcher.
    pub async fn shutdown(&self) {
        self.stop_maintenance().await;
    }
}

/// Build the lease record a successful read should leave in the cache.
fn build_record(
    config: &ClientConfig,
    descriptor: &CallDescriptor,
    options: &LeaseOptions,
    response: &ApiResponse,
) -> Result<LeaseRecord> {
    let window = options.renewal_window.unwrap_or_else(|| config.renewal_window());
    let jitter_cap = config.check_jitter();
    let rotate_with =
        options.rotate_with.clone().unwrap_or_else(|| descriptor.clone());

    if let Some(info) = LeaseInfo::from_response(response) {
        let key = info
            .lease_id
            .clone()
            .or_else(|| options.cache_key.clone())
            .ok_or_else(|| {
                ClientError::invalid_response(format!(
                    "Response for '{}' carried lease metadata but no usable cache key",
                    descriptor.operation
                ))
            })?;

        let mut record = LeaseRecord::new(
            key,
            response.payload(),
            info.duration,
            info.renewable,
            window,
            jitter_cap,
        )
        .with_callbacks(options.callbacks.clone())
        .with_rotate_descriptor(rotate_with);

        if info.renewable {
            let renew = options.renew_with.clone().or_else(|| {
                info.lease_id
                    .as_deref()
                    .map(|id| crate::engines::sys::renew_lease_descriptor(id, info.duration))
            });
            if let Some(renew) = renew {
                record = record.with_renew_descriptor(renew);
            }
        }

        return Ok(record);
    }

    if let Some(ttl) = options.pseudo_ttl {
        let key = options
            .cache_key
            .clone()
            .unwrap_or_else(|| descriptor.path.trim_start_matches("v1/").to_string());

        return Ok(LeaseRecord::new(key, response.payload(), ttl, false, window, jitter_cap)
            .with_callbacks(options.callbacks.clone())
            .with_rotate_descriptor(rotate_with));
    }

    Err(ClientError::invalid_response(format!(
        "Response for '{}' carried no lease metadata and no pseudo-TTL was requested",
        descriptor.operation
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecutionStrategy;
    use crate::lease::LeaseState;
    use crate::transport::Method;
    use async_trait::async_trait;
    use serde_json::json;

    struct CannedTransport {
        response: Box<dyn Fn(&CallDescriptor) -> Result<ApiResponse> + Send + Sync>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(&self, descriptor: &CallDescriptor) -> Result<ApiResponse> {
            (self.response)(descriptor)
        }
    }

    fn client_with(
        strategy: ExecutionStrategy,
        response: impl Fn(&CallDescriptor) -> Result<ApiResponse> + Send + Sync + 'static,
    ) -> Client {
        let config = ClientConfig { execution_strategy: strategy, ..Default::default() };
        Client::with_transport(
            config,
            Arc::new(CannedTransport { response: Box::new(response) }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_leased_read_populates_cache() {
        let client = client_with(ExecutionStrategy::Blocking, |_| {
            Ok(ApiResponse::new(
                200,
                json!({
                    "lease_id": "database/creds/app/abc",
                    "lease_duration": 300,
                    "renewable": true,
                    "data": {"username": "u", "password": "p"}
                }),
            ))
        });

        let descriptor = CallDescriptor::new("db.creds", Method::Get, "v1/database/creds/app");
        let record = client
            .invoke_leased(descriptor.clone(), LeaseOptions::new())
            .await
            .wait()
            .await
            .unwrap();

        assert_eq!(record.key, "database/creds/app/abc");
        assert_eq!(record.state, LeaseState::Active);
        assert!(record.renewable);
        assert!(record.renew_with.is_some());
        assert_eq!(record.rotate_with.as_ref(), Some(&descriptor));

        let cached = client.lease("database/creds/app/abc").unwrap();
        assert_eq!(cached.value, json!({"username": "u", "password": "p"}));
    }

    #[tokio::test]
    async fn test_leaseless_read_requires_pseudo_ttl() {
        let client = client_with(ExecutionStrategy::Blocking, |_| {
            Ok(ApiResponse::new(200, json!({"lease_duration": 0, "data": {"k": "v"}})))
        });
        let descriptor = CallDescriptor::new("kv.read", Method::Get, "v1/secret/data/app");

        let err = client
            .invoke_leased(descriptor.clone(), LeaseOptions::new())
            .await
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse { .. }));

        let record = client
            .invoke_leased(
                descriptor,
                LeaseOptions::new().with_pseudo_ttl(Duration::from_secs(120)),
            )
            .await
            .wait()
            .await
            .unwrap();
        assert_eq!(record.key, "secret/data/app");
        assert!(!record.renewable);
        assert!(record.rotate_with.is_some());
    }

    #[tokio::test]
    async fn test_revoke_removes_record_even_on_server_error() {
        let client = client_with(ExecutionStrategy::Blocking, |descriptor| {
            if descriptor.operation == "lease.revoke" {
                Err(ClientError::not_found("v1/sys/leases/revoke"))
            } else {
                Ok(ApiResponse::new(
                    200,
                    json!({"lease_id": "db/abc", "lease_duration": 60, "renewable": false}),
                ))
            }
        });

        let descriptor = CallDescriptor::new("db.creds", Method::Get, "v1/database/creds/app");
        client.invoke_leased(descriptor, LeaseOptions::new()).await.wait().await.unwrap();
        assert!(client.lease("db/abc").is_some());

        let result = client.revoke("db/abc").await;
        assert!(result.is_err());
        assert!(client.lease("db/abc").is_none());
    }

    #[tokio::test]
    async fn test_start_maintenance_is_idempotent() {
        let client = client_with(ExecutionStrategy::Blocking, |_| {
            Ok(ApiResponse::new(200, json!({})))
        });

        client.start_maintenance();
        client.start_maintenance();
        client.shutdown().await;

        // A second start after shutdown is allowed.
        client.start_maintenance();
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_deferred_strategy_returns_before_resolution() {
        let client = client_with(ExecutionStrategy::Deferred, |_| {
            Err(ClientError::permission_denied("v1/secret/data/app"))
        });

        let descriptor = CallDescriptor::new("kv.read", Method::Get, "v1/secret/data/app");
        let handle = client.invoke(descriptor).await;
        let outcome = handle.outcome().await;
        assert!(matches!(outcome.err(), Some(ClientError::PermissionDenied { .. })));
    }
}
