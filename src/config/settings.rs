//! # Configuration Settings
//!
//! Defines the configuration structure for the latchkey client runtime.
//!
//! The renewal-window / check-period / check-jitter values are operational
//! tuning knobs, not structural requirements; the defaults (600s / 60s / 20s)
//! suit services that issue leases in the tens-of-minutes range.

use crate::errors::{ClientError, Result};
use crate::exec::ExecutionStrategy;
use crate::types::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Client configuration.
///
/// Built either directly, via [`ClientConfig::from_env`], or from a larger
/// application config that embeds it. [`ClientConfig::validate`] must pass
/// before a client is constructed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClientConfig {
    /// Secret-management server address (e.g. "https://vault.example.com:8200")
    #[validate(length(min = 1, message = "Address cannot be empty"))]
    pub address: String,

    /// Authentication token presented on every request (redacted in logs)
    pub token: Option<SecretString>,

    /// Namespace header for multi-tenant servers
    pub namespace: Option<String>,

    /// How results are delivered to callers and how retries are driven
    pub execution_strategy: ExecutionStrategy,

    /// Seconds before expiry at which lease renewal should begin
    #[validate(range(min = 1, message = "Renewal window must be at least 1 second"))]
    pub renewal_window_secs: u64,

    /// Maintenance scheduler tick interval in seconds
    #[validate(range(min = 1, message = "Check period must be at least 1 second"))]
    pub check_period_secs: u64,

    /// Maximum random spread applied to each lease's effective renewal time,
    /// in seconds. Zero disables jitter.
    pub check_jitter_secs: u64,

    /// Total time budget for retrying a single call, in seconds
    #[validate(range(min = 1, message = "Max retry duration must be at least 1 second"))]
    pub max_retry_duration_secs: u64,

    /// Delay between retry attempts, in milliseconds
    #[validate(range(min = 1, message = "Retry interval must be at least 1ms"))]
    pub retry_interval_ms: u64,

    /// Per-request timeout for the HTTP transport, in seconds
    #[validate(range(min = 1, max = 300, message = "Request timeout must be between 1 and 300 seconds"))]
    pub request_timeout_secs: u64,

    /// Number of background workers issuing renew/rotate calls
    #[validate(range(min = 1, max = 64, message = "Maintenance workers must be between 1 and 64"))]
    pub maintenance_workers: usize,

    /// Optional dedicated runtime for user lifecycle callbacks. When unset,
    /// callbacks run on the ambient runtime's blocking pool.
    #[serde(skip)]
    pub callback_executor: Option<tokio::runtime::Handle>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            execution_strategy: ExecutionStrategy::Blocking,
            renewal_window_secs: 600,
            check_period_secs: 60,
            check_jitter_secs: 20,
            max_retry_duration_secs: 30,
            retry_interval_ms: 1000,
            request_timeout_secs: 30,
            maintenance_workers: 4,
            callback_executor: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `LATCHKEY_ADDR`: server address (required)
    /// - `LATCHKEY_TOKEN`: authentication token
    /// - `LATCHKEY_NAMESPACE`: optional namespace
    /// - `LATCHKEY_EXECUTION_STRATEGY`: `blocking` | `deferred` | `future`
    ///
    /// # Errors
    ///
    /// - [`ClientError::Config`] if `LATCHKEY_ADDR` is not set or the
    ///   strategy name is unknown
    pub fn from_env() -> Result<Self> {
        let address = std::env::var("LATCHKEY_ADDR")
            .map_err(|_| ClientError::config("LATCHKEY_ADDR environment variable not set"))?;

        let token = std::env::var("LATCHKEY_TOKEN").ok().map(SecretString::from);
        let namespace = std::env::var("LATCHKEY_NAMESPACE").ok();

        let execution_strategy = match std::env::var("LATCHKEY_EXECUTION_STRATEGY") {
            Ok(name) => name.parse::<ExecutionStrategy>()?,
            Err(_) => ExecutionStrategy::Blocking,
        };

        Ok(Self { address, token, namespace, execution_strategy, ..Self::default() })
    }

    /// Validate the entire configuration.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| ClientError::config(format!("Invalid configuration: {}", e)))?;

        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do.
    fn validate_custom(&self) -> Result<()> {
        url::Url::parse(&self.address)
            .map_err(|e| ClientError::config(format!("Invalid server address: {}", e)))?;

        // Jitter pushes the effective renewal time towards expiry; it must
        // never be able to push it past expiry.
        if self.check_jitter_secs >= self.renewal_window_secs {
            return Err(ClientError::config(
                "Check jitter must be smaller than the renewal window",
            ));
        }

        if self.retry_interval_ms > self.max_retry_duration_secs * 1000 {
            return Err(ClientError::config(
                "Retry interval cannot exceed the max retry duration",
            ));
        }

        Ok(())
    }

    /// Renewal window as a Duration.
    pub fn renewal_window(&self) -> Duration {
        Duration::from_secs(self.renewal_window_secs)
    }

    /// Scheduler tick interval as a Duration.
    pub fn check_period(&self) -> Duration {
        Duration::from_secs(self.check_period_secs)
    }

    /// Maximum jitter as a Duration.
    pub fn check_jitter(&self) -> Duration {
        Duration::from_secs(self.check_jitter_secs)
    }

    /// Per-call retry budget as a Duration.
    pub fn max_retry_duration(&self) -> Duration {
        Duration::from_secs(self.max_retry_duration_secs)
    }

    /// Delay between retry attempts as a Duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Per-request transport timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
