//! Parsed service responses and lease metadata extraction.

use serde_json::Value;
use std::time::Duration;

/// A successful (2xx) response from the service, with the body already
/// parsed into a generic JSON tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code (always 2xx)
    pub status: u16,

    /// Parsed response body; `Value::Null` for empty bodies (e.g. 204)
    pub body: Value,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// The `data` envelope, if present.
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// The `auth` envelope (present on login/token responses), if any.
    pub fn auth(&self) -> Option<&Value> {
        self.body.get("auth")
    }

    /// The opaque payload a lease record should own: the auth envelope for
    /// token responses, otherwise the data envelope, otherwise the whole body.
    pub fn payload(&self) -> Value {
        if let Some(auth) = self.auth() {
            return auth.clone();
        }
        if let Some(data) = self.data() {
            return data.clone();
        }
        self.body.clone()
    }
}

/// Lease metadata carried by a response, extracted from either the lease
/// envelope or the auth envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseInfo {
    /// Server-issued lease identifier; absent for leaseless secrets and for
    /// token leases, which renew through their own endpoint.
    pub lease_id: Option<String>,

    /// Validity duration granted by the server.
    pub duration: Duration,

    /// Whether the server will extend this lease on request.
    pub renewable: bool,
}

impl LeaseInfo {
    /// Extract lease metadata from a response.
    ///
    /// Token responses carry their grant inside the `auth` envelope
    /// (`lease_duration`, `renewable`); everything else uses the top-level
    /// lease fields. Returns `None` when the response grants no time-bound
    /// material at all (plain KV reads, empty writes).
    pub fn from_response(response: &ApiResponse) -> Option<Self> {
        if let Some(auth) = response.auth() {
            let duration = auth.get("lease_duration").and_then(Value::as_u64)?;
            if duration == 0 {
                return None;
            }
            return Some(Self {
                lease_id: None,
                duration: Duration::from_secs(duration),
                renewable: auth.get("renewable").and_then(Value::as_bool).unwrap_or(false),
            });
        }

        let lease_id = response
            .body
            .get("lease_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let duration = response.body.get("lease_duration").and_then(Value::as_u64).unwrap_or(0);

        if lease_id.is_none() && duration == 0 {
            return None;
        }

        Some(Self {
            lease_id,
            duration: Duration::from_secs(duration),
            renewable: response.body.get("renewable").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}
