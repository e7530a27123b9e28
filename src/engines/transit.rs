//! Encryption-as-a-service engine.
//!
//! Plaintext travels base64-encoded; ciphertext is the server's opaque
//! string format. Neither operation produces a lease.

use crate::client::Client;
use crate::errors::{ClientError, Result};
use crate::transport::{CallDescriptor, Method};
use base64::Engine as _;
use serde_json::{json, Value};

/// Encrypt `plaintext` under the named key.
pub async fn encrypt(client: &Client, mount: &str, key: &str, plaintext: &[u8]) -> Result<String> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(plaintext);
    let descriptor = CallDescriptor::new(
        "transit.encrypt",
        Method::Post,
        format!("v1/{}/encrypt/{}", mount, key),
    )
    .with_body(json!({"plaintext": encoded}));

    let response = client.invoke(descriptor).await.wait().await?;
    response
        .data()
        .and_then(|data| data.get("ciphertext"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::invalid_response(format!(
                "Encrypt response for key '{}' has no ciphertext",
                key
            ))
        })
}

/// Decrypt a ciphertext produced by [`encrypt`].
pub async fn decrypt(client: &Client, mount: &str, key: &str, ciphertext: &str) -> Result<Vec<u8>> {
    let descriptor = CallDescriptor::new(
        "transit.decrypt",
        Method::Post,
        format!("v1/{}/decrypt/{}", mount, key),
    )
    .with_body(json!({"ciphertext": ciphertext}));

    let response = client.invoke(descriptor).await.wait().await?;
    let encoded = response
        .data()
        .and_then(|data| data.get("plaintext"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ClientError::invalid_response(format!(
                "Decrypt response for key '{}' has no plaintext",
                key
            ))
        })?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ClientError::invalid_response(format!("Plaintext is not valid base64: {}", e)))
}
