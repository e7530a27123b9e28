//! System endpoints: health, lease renew, lease revoke.

use crate::client::Client;
use crate::errors::{ClientError, Result};
use crate::transport::{CallDescriptor, LeaseInfo, Method};
use serde_json::json;
use std::time::Duration;

/// Descriptor for renewing a lease by id, requesting `increment` more time.
///
/// The maintenance scheduler replays this to keep dynamic-secret leases
/// alive; token leases use their own renew endpoint instead.
pub fn renew_lease_descriptor(lease_id: &str, increment: Duration) -> CallDescriptor {
    CallDescriptor::new("lease.renew", Method::Put, "v1/sys/leases/renew")
        .with_body(json!({"lease_id": lease_id, "increment": increment.as_secs()}))
}

/// Descriptor for revoking a lease by id.
pub fn revoke_lease_descriptor(lease_id: &str) -> CallDescriptor {
    CallDescriptor::new("lease.revoke", Method::Put, "v1/sys/leases/revoke")
        .with_body(json!({"lease_id": lease_id}))
}

/// Check server health. Returns the raw health payload.
pub async fn health(client: &Client) -> Result<serde_json::Value> {
    let descriptor = CallDescriptor::new("sys.health", Method::Get, "v1/sys/health");
    let response = client.invoke(descriptor).await.wait().await?;
    Ok(response.body)
}

/// Renew a lease once, in the foreground, returning the fresh grant.
pub async fn renew_lease(
    client: &Client,
    lease_id: &str,
    increment: Duration,
) -> Result<LeaseInfo> {
    let descriptor = renew_lease_descriptor(lease_id, increment);
    let response = client.invoke(descriptor).await.wait().await?;
    LeaseInfo::from_response(&response).ok_or_else(|| {
        ClientError::invalid_response(format!(
            "Renewal response for '{}' carried no lease metadata",
            lease_id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_descriptor_shape() {
        let descriptor = renew_lease_descriptor("db/creds/app/abc", Duration::from_secs(300));
        assert_eq!(descriptor.method, Method::Put);
        assert_eq!(descriptor.path, "v1/sys/leases/renew");
        assert_eq!(
            descriptor.body.unwrap(),
            json!({"lease_id": "db/creds/app/abc", "increment": 300})
        );
    }

    #[test]
    fn test_revoke_descriptor_shape() {
        let descriptor = revoke_lease_descriptor("db/creds/app/abc");
        assert_eq!(descriptor.path, "v1/sys/leases/revoke");
        assert_eq!(descriptor.body.unwrap(), json!({"lease_id": "db/creds/app/abc"}));
    }
}
