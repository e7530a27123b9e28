//! Authentication token operations.
//!
//! Token grants arrive inside the `auth` envelope and renew through their
//! own `renew` endpoint rather than the generic lease-renew path; the lease
//! record is wired accordingly.

use crate::client::{Client, LeaseOptions};
use crate::errors::{ClientError, Result};
use crate::lease::{LeaseCallbacks, LeaseRecord};
use crate::transport::{CallDescriptor, Method};
use serde_json::{json, Value};
use std::time::Duration;

/// Create a child token and hold its lease.
///
/// The record is cached under `auth/token/{accessor}`; its payload is the
/// auth envelope (`client_token`, `accessor`, policies). Renewal goes
/// through the token renew endpoint, rotation replays the create call.
pub async fn create(
    client: &Client,
    ttl: Option<Duration>,
    callbacks: LeaseCallbacks,
) -> Result<LeaseRecord> {
    let mut body = json!({});
    if let Some(ttl) = ttl {
        body["ttl"] = json!(format!("{}s", ttl.as_secs()));
    }
    let descriptor =
        CallDescriptor::new("token.create", Method::Post, "v1/auth/token/create").with_body(body);

    // The renew call embeds the issued token, so the record is built from
    // the response rather than through invoke_leased.
    let response = client.invoke(descriptor.clone()).await.wait().await?;
    let auth = response.auth().ok_or_else(|| {
        ClientError::invalid_response("Token create response has no auth envelope")
    })?;

    let accessor = auth
        .get("accessor")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let client_token = auth.get("client_token").and_then(Value::as_str).ok_or_else(|| {
        ClientError::invalid_response("Token create response has no client_token")
    })?;

    let options = LeaseOptions {
        cache_key: Some(format!("auth/token/{}", accessor)),
        renew_with: Some(renew_descriptor(client_token)),
        rotate_with: Some(descriptor.clone()),
        callbacks,
        ..LeaseOptions::default()
    };

    client.cache_response(&descriptor, &options, &response)
}

/// Look up the token the client is currently authenticated with.
pub async fn lookup_self(client: &Client) -> Result<Value> {
    let descriptor =
        CallDescriptor::new("token.lookup_self", Method::Get, "v1/auth/token/lookup-self");
    let response = client.invoke(descriptor).await.wait().await?;
    response.data().cloned().ok_or_else(|| {
        ClientError::invalid_response("Token lookup response has no data envelope")
    })
}

fn renew_descriptor(token: &str) -> CallDescriptor {
    CallDescriptor::new("token.renew", Method::Post, "v1/auth/token/renew")
        .with_body(json!({"token": token}))
}
