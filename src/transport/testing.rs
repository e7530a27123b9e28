//! In-process transport stub for unit tests.

use super::{ApiResponse, CallDescriptor, Transport};
use crate::errors::Result;
use async_trait::async_trait;

/// Answers every call from a canned closure.
pub(crate) struct CannedTransport {
    respond: Box<dyn Fn(&CallDescriptor) -> Result<ApiResponse> + Send + Sync>,
}

impl CannedTransport {
    pub fn new(
        respond: impl Fn(&CallDescriptor) -> Result<ApiResponse> + Send + Sync + 'static,
    ) -> Self {
        Self { respond: Box::new(respond) }
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn send(&self, descriptor: &CallDescriptor) -> Result<ApiResponse> {
        (self.respond)(descriptor)
    }
}
