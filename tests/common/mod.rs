//! In-process mock secret service for timing-sensitive integration tests.
//!
//! Implements the transport seam directly so the maintenance scheduler can
//! be driven under tokio's paused clock: renewals, rotations and failures
//! are all scripted, and attempt timings are recorded for assertions.

use async_trait::async_trait;
use latchkey::errors::{ClientError, Result};
use latchkey::transport::{ApiResponse, CallDescriptor, Transport};
use latchkey::{Client, ClientConfig, ExecutionStrategy};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Scripted outcome for a class of calls.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    NotRenewable,
    Forbidden,
    ServerError,
}

/// In-process stand-in for the secret-management service.
pub struct MockSecretService {
    issued: AtomicU64,

    /// Renewal round trips observed (lease renew + token renew).
    pub renew_calls: AtomicU32,
    /// Credential issuance round trips observed (initial reads and
    /// rotation replays both land here).
    pub creds_calls: AtomicU32,
    /// Virtual start time of every renewal attempt.
    pub renew_started: Mutex<Vec<Instant>>,
    /// High-water mark of concurrently in-flight renewals.
    pub max_in_flight: AtomicI32,

    in_flight: AtomicI32,
    renew_outcome: Mutex<Outcome>,
    creds_outcome: Mutex<Outcome>,

    /// Seconds granted when issuing credentials.
    pub issue_duration_secs: AtomicU64,
    /// Seconds granted when renewing a lease.
    pub renew_duration_secs: AtomicU64,
    /// Whether issued leases are renewable.
    pub issue_renewable: AtomicBool,
    /// Simulated server latency for renewals, in milliseconds.
    pub renew_delay_ms: AtomicU64,
}

impl MockSecretService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            issued: AtomicU64::new(0),
            renew_calls: AtomicU32::new(0),
            creds_calls: AtomicU32::new(0),
            renew_started: Mutex::new(Vec::new()),
            max_in_flight: AtomicI32::new(0),
            in_flight: AtomicI32::new(0),
            renew_outcome: Mutex::new(Outcome::Succeed),
            creds_outcome: Mutex::new(Outcome::Succeed),
            issue_duration_secs: AtomicU64::new(10),
            renew_duration_secs: AtomicU64::new(10),
            issue_renewable: AtomicBool::new(true),
            renew_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn set_renew_outcome(&self, outcome: Outcome) {
        *self.renew_outcome.lock().unwrap() = outcome;
    }

    pub fn set_creds_outcome(&self, outcome: Outcome) {
        *self.creds_outcome.lock().unwrap() = outcome;
    }

    fn fail(outcome: Outcome, path: &str) -> Option<ClientError> {
        match outcome {
            Outcome::Succeed => None,
            Outcome::NotRenewable => {
                Some(ClientError::client_status(400, "lease is not renewable"))
            }
            Outcome::Forbidden => Some(ClientError::permission_denied(path)),
            Outcome::ServerError => Some(ClientError::server(503, "service unavailable")),
        }
    }

    async fn handle_renew(&self, descriptor: &CallDescriptor) -> Result<ApiResponse> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.renew_started.lock().unwrap().push(Instant::now());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.renew_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = *self.renew_outcome.lock().unwrap();
        if let Some(error) = Self::fail(outcome, &descriptor.path) {
            return Err(error);
        }

        let lease_id = descriptor
            .body
            .as_ref()
            .and_then(|body| body.get("lease_id"))
            .and_then(|id| id.as_str())
            .unwrap_or("")
            .to_string();
        Ok(ApiResponse::new(
            200,
            json!({
                "lease_id": lease_id,
                "lease_duration": self.renew_duration_secs.load(Ordering::SeqCst),
                "renewable": true
            }),
        ))
    }

    fn handle_creds(&self, descriptor: &CallDescriptor) -> Result<ApiResponse> {
        self.creds_calls.fetch_add(1, Ordering::SeqCst);

        let outcome = *self.creds_outcome.lock().unwrap();
        if let Some(error) = Self::fail(outcome, &descriptor.path) {
            return Err(error);
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let role = descriptor.path.rsplit('/').next().unwrap_or("app");
        Ok(ApiResponse::new(
            200,
            json!({
                "lease_id": format!("database/creds/{}/{}", role, n),
                "lease_duration": self.issue_duration_secs.load(Ordering::SeqCst),
                "renewable": self.issue_renewable.load(Ordering::SeqCst),
                "data": {"username": format!("v-{}-{}", role, n), "password": "pw"}
            }),
        ))
    }
}

#[async_trait]
impl Transport for MockSecretService {
    async fn send(&self, descriptor: &CallDescriptor) -> Result<ApiResponse> {
        match descriptor.operation.as_str() {
            "lease.renew" | "token.renew" => self.handle_renew(descriptor).await,
            "db.creds" => self.handle_creds(descriptor),
            "lease.revoke" => Ok(ApiResponse::new(204, serde_json::Value::Null)),
            "sys.health" => Ok(ApiResponse::new(200, json!({"initialized": true}))),
            "kv.read" => Ok(ApiResponse::new(
                200,
                json!({"data": {"data": {"api_key": "k"}, "metadata": {"version": 1}}}),
            )),
            _ => Ok(ApiResponse::new(200, json!({}))),
        }
    }
}

/// Config tuned for second-scale scheduler tests: 1s ticks, no jitter.
pub fn scheduler_config(renewal_window_secs: u64) -> ClientConfig {
    ClientConfig {
        execution_strategy: ExecutionStrategy::Blocking,
        renewal_window_secs,
        check_period_secs: 1,
        check_jitter_secs: 0,
        max_retry_duration_secs: 2,
        retry_interval_ms: 100,
        maintenance_workers: 2,
        ..ClientConfig::default()
    }
}

pub fn client_over(service: Arc<MockSecretService>, config: ClientConfig) -> Client {
    Client::with_transport(config, service).unwrap()
}

/// Advance the paused clock in small steps, yielding between steps so
/// scheduler ticks and worker jobs interleave the way they would in real
/// time.
pub async fn advance_secs(secs: u64) {
    let steps = secs * 10;
    for _ in 0..steps {
        tokio::time::advance(Duration::from_millis(100)).await;
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }
}

/// Wait (in real time) for a condition driven by blocking-pool work, such
/// as a lease callback. Panics after ~2 seconds of wall time.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
        tokio::task::yield_now().await;
    }
    panic!("condition was not met in time");
}
