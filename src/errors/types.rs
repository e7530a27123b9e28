//! Error types for client operations against the secret-management service.

use thiserror::Error;

/// Result type for latchkey operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the secret-management service or
/// while maintaining held leases.
///
/// Retryability is an intrinsic property of each variant (see
/// [`ClientError::is_retryable`]): transport-level failures and server-side
/// conditions are worth another attempt, everything the client itself got
/// wrong is terminal on the first try.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (connect, DNS, TLS, timeout). Always retryable.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The server answered with a 5xx status. Retryable.
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The server asked us to slow down (429). Retryable with backoff.
    #[error("Rate limited by server")]
    RateLimited { retry_after: Option<u64> },

    /// A 4xx status other than not-found / permission-denied. Terminal.
    #[error("Client error (status {status}): {message}")]
    ClientStatus { status: u16, message: String },

    /// The requested path does not exist. Terminal; callers may downgrade
    /// this to a default value at the call site.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// The server refused access to the path. Terminal.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    /// The server reported that a lease cannot be renewed. Internal signal
    /// that causes fallback to rotation; never surfaced to foreground callers.
    #[error("Lease not renewable: {key}")]
    LeaseNotRenewable { key: String },

    /// Rotation exhausted its options for a lease. Surfaced only through the
    /// lease's `on_error` callback.
    #[error("Rotation failed for lease '{key}': {reason}")]
    RotationFailed { key: String, reason: String },

    /// The server answered 2xx but the body did not have the expected shape.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Client configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// An `await` with a timeout expired before the handle resolved.
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error (e.g. a response handle abandoned by its
    /// producer before resolution).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Create a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Create a rate-limited error.
    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Create a client-status error.
    pub fn client_status(status: u16, message: impl Into<String>) -> Self {
        Self::ClientStatus { status, message: message.into() }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a permission denied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// Create a lease-not-renewable signal.
    pub fn lease_not_renewable(key: impl Into<String>) -> Self {
        Self::LeaseNotRenewable { key: key.into() }
    }

    /// Create a rotation failed error.
    pub fn rotation_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RotationFailed { key: key.into(), reason: reason.into() }
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether another attempt at the same request could succeed.
    ///
    /// Network failures, 5xx responses and rate limiting are retryable up to
    /// the per-call deadline; everything else fails on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Server { .. } | Self::RateLimited { .. }
        )
    }
}
