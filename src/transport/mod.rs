//! # Transport Invoker
//!
//! One HTTP request/response round trip against the secret-management
//! service, with outcome classification.
//!
//! The rest of the runtime never touches HTTP directly: it hands a
//! [`CallDescriptor`] to a [`Transport`] and gets back either a structurally
//! parsed [`ApiResponse`] or a classified [`crate::errors::ClientError`].
//! That seam is also what tests implement in-process to drive the scheduler
//! without a network.

pub mod http;
pub mod response;

#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpTransport;
pub use response::{ApiResponse, LeaseInfo};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// HTTP method for a service call.
///
/// `List` is the service's non-standard listing verb; the HTTP transport
/// maps it to a literal `LIST` request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    List,
}

impl Method {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::List => "LIST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes one call against the service: which endpoint, with what body,
/// under what operation name (used for logging and metrics only).
///
/// Descriptors are plain data and cheap to clone; lease records keep hold of
/// the descriptors needed to renew and to rotate themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    /// Short operation name for logs/metrics (e.g. "kv.read", "lease.renew")
    pub operation: String,

    /// HTTP method
    pub method: Method,

    /// Request path relative to the server address (e.g. "v1/secret/data/app")
    pub path: String,

    /// Optional JSON request body
    pub body: Option<serde_json::Value>,
}

impl CallDescriptor {
    /// Create a descriptor with no body.
    pub fn new(operation: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self { operation: operation.into(), method, path: path.into(), body: None }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A transport issues exactly one round trip per [`Transport::send`] call and
/// classifies the outcome. Retries, caching and lease bookkeeping all happen
/// above this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the described call once.
    ///
    /// Any 2xx response is a success; other statuses and transport-level
    /// failures come back as the matching [`crate::errors::ClientError`]
    /// variant.
    async fn send(&self, descriptor: &CallDescriptor) -> Result<ApiResponse>;
}
