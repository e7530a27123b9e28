//! HTTP transport backed by `reqwest`.
//!
//! All communication should use TLS in production deployments; the token is
//! held as a [`SecretString`] and never logged.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use super::{ApiResponse, CallDescriptor, Method, Transport};
use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::types::SecretString;

/// Header carrying the authentication token.
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Header carrying the namespace on multi-tenant servers.
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// HTTP transport issuing one round trip per call against the
/// secret-management service.
///
/// # Thread Safety
///
/// `HttpTransport` is `Send + Sync`; the underlying `reqwest::Client` pools
/// connections internally and is safe to share across tasks.
pub struct HttpTransport {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    namespace: Option<String>,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Config`] if the address is not a valid URL or the
    ///   HTTP client cannot be constructed
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.address)
            .map_err(|e| ClientError::config(format!("Invalid server address: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            token: config.token.clone(),
            namespace: config.namespace.clone(),
        })
    }

    fn request_url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::config(format!("Invalid request path '{}': {}", path, e)))
    }

    fn http_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            // The service's listing verb is a literal LIST request method.
            Method::List => reqwest::Method::from_bytes(b"LIST").expect("LIST is a valid method"),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, descriptor: &CallDescriptor) -> Result<ApiResponse> {
        let url = self.request_url(&descriptor.path)?;

        let mut request = self.http.request(Self::http_method(descriptor.method), url);

        if let Some(ref token) = self.token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }
        if let Some(ref namespace) = self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        if let Some(ref body) = descriptor.body {
            request = request.json(body);
        }

        tracing::debug!(
            operation = %descriptor.operation,
            method = %descriptor.method,
            path = %descriptor.path,
            "Sending request"
        );

        let response = request.send().await.map_err(|e| {
            tracing::debug!(operation = %descriptor.operation, error = %e, "Transport failure");
            ClientError::network(e.to_string())
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let text = response
            .text()
            .await
            .map_err(|e| ClientError::network(format!("Failed to read response body: {}", e)))?;

        classify(status, descriptor, &text, retry_after)
    }
}

/// Classify a completed round trip into a success or a taxonomy error.
///
/// Any 2xx is success; 404 and 403 map to their dedicated terminal variants,
/// 429 and 5xx are retryable, every other 4xx is terminal.
fn classify(
    status: StatusCode,
    descriptor: &CallDescriptor,
    text: &str,
    retry_after: Option<u64>,
) -> Result<ApiResponse> {
    if status.is_success() {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).map_err(|e| {
                ClientError::invalid_response(format!(
                    "Malformed JSON body for {}: {}",
                    descriptor.operation, e
                ))
            })?
        };
        return Ok(ApiResponse::new(status.as_u16(), body));
    }

    let message = error_messages(text);
    tracing::debug!(
        operation = %descriptor.operation,
        status = status.as_u16(),
        message = %message,
        "Request rejected"
    );

    match status.as_u16() {
        404 => Err(ClientError::not_found(&descriptor.path)),
        403 => Err(ClientError::permission_denied(&descriptor.path)),
        429 => Err(ClientError::rate_limited(retry_after)),
        500..=599 => Err(ClientError::server(status.as_u16(), message)),
        _ => Err(ClientError::client_status(status.as_u16(), message)),
    }
}

/// Pull the server's `errors` array out of a failure body, falling back to
/// the raw text.
fn error_messages(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| {
            body.get("errors").and_then(Value::as_array).map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        })
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| text.trim().to_string())
}
