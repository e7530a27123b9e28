//! Versioned key/value secrets engine.
//!
//! KV reads are leaseless; [`read_cached`] holds them under a pseudo-TTL so
//! the maintenance scheduler refreshes them by replaying the read.

use crate::client::{Client, LeaseOptions};
use crate::errors::{ClientError, Result};
use crate::lease::{LeaseCallbacks, LeaseRecord};
use crate::transport::{CallDescriptor, Method};
use serde_json::{json, Value};
use std::time::Duration;

fn data_path(mount: &str, path: &str) -> String {
    format!("v1/{}/data/{}", mount, path)
}

/// Read the latest version of a secret. Returns the secret's key/value map.
pub async fn read(client: &Client, mount: &str, path: &str) -> Result<Value> {
    let descriptor = CallDescriptor::new("kv.read", Method::Get, data_path(mount, path));
    let response = client.invoke(descriptor).await.wait().await?;

    // KV v2 nests the user payload one level below the response envelope.
    response
        .data()
        .and_then(|data| data.get("data"))
        .cloned()
        .ok_or_else(|| {
            ClientError::invalid_response(format!("Secret '{}/{}' has no data payload", mount, path))
        })
}

/// Read a secret, substituting `default` when the path does not exist.
///
/// Every other error still propagates.
pub async fn read_or(client: &Client, mount: &str, path: &str, default: Value) -> Result<Value> {
    match read(client, mount, path).await {
        Ok(value) => Ok(value),
        Err(ClientError::NotFound { .. }) => Ok(default),
        Err(error) => Err(error),
    }
}

/// Read a secret and hold it in the lease cache under a pseudo-TTL.
///
/// The record's key is `{mount}/data/{path}`; when the TTL elapses the
/// scheduler re-reads the secret and fires `on_rotate` with the fresh copy.
pub async fn read_cached(
    client: &Client,
    mount: &str,
    path: &str,
    ttl: Duration,
    callbacks: LeaseCallbacks,
) -> Result<LeaseRecord> {
    let descriptor = CallDescriptor::new("kv.read", Method::Get, data_path(mount, path));
    let options = LeaseOptions::new().with_pseudo_ttl(ttl).with_callbacks(callbacks);
    client.invoke_leased(descriptor, options).await.wait().await
}

/// Store or update a secret.
pub async fn set(client: &Client, mount: &str, path: &str, data: Value) -> Result<()> {
    let descriptor = CallDescriptor::new("kv.set", Method::Post, data_path(mount, path))
        .with_body(json!({"data": data}));
    client.invoke(descriptor).await.wait().await.map(|_| ())
}

/// Delete the latest version of a secret.
pub async fn delete(client: &Client, mount: &str, path: &str) -> Result<()> {
    let descriptor = CallDescriptor::new("kv.delete", Method::Delete, data_path(mount, path));
    client.invoke(descriptor).await.wait().await.map(|_| ())
}

/// List secret names under a path prefix.
pub async fn list(client: &Client, mount: &str, path: &str) -> Result<Vec<String>> {
    let descriptor = CallDescriptor::new(
        "kv.list",
        Method::List,
        format!("v1/{}/metadata/{}", mount, path),
    );
    let response = client.invoke(descriptor).await.wait().await?;

    let keys = response
        .data()
        .and_then(|data| data.get("keys"))
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    Ok(keys)
}
