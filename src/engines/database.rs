//! Dynamic database credentials engine.

use crate::client::{Client, LeaseOptions};
use crate::errors::Result;
use crate::lease::{LeaseCallbacks, LeaseRecord};
use crate::transport::{CallDescriptor, Method};

/// Generate a dynamic credential pair for `role`.
///
/// The response carries a real lease; the returned record is already in the
/// cache with renew and rotate descriptors wired, so starting the
/// maintenance scheduler is all that is needed to keep the credentials
/// valid. The credential payload lives in `record.value` (`username` /
/// `password`).
pub async fn generate_credentials(
    client: &Client,
    mount: &str,
    role: &str,
    callbacks: LeaseCallbacks,
) -> Result<LeaseRecord> {
    let descriptor = CallDescriptor::new(
        "db.creds",
        Method::Get,
        format!("v1/{}/creds/{}", mount, role),
    );
    let options = LeaseOptions::new().with_callbacks(callbacks);
    client.invoke_leased(descriptor, options).await.wait().await
}
