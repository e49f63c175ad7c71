pub mod repo;
pub mod service;

use crate::{ClientResult, ImportClient, ImportClientFactory};
use mockhost_core::{AllocatedEndpoint, ManagedServiceInstance};
use repo::ReqwestImportTransport;
use std::sync::Arc;
use std::time::Duration;

pub use service::HttpImportClient;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates one reqwest-backed import client per managed instance, pointed at
/// the instance's allocated endpoint.
#[derive(Debug, Clone)]
pub struct HttpImportClientFactory {
    request_timeout: Duration,
}

impl HttpImportClientFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for HttpImportClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl ImportClientFactory for HttpImportClientFactory {
    fn create(
        &self,
        instance: &ManagedServiceInstance,
        endpoint: &AllocatedEndpoint,
    ) -> ClientResult<Arc<dyn ImportClient>> {
        let transport = ReqwestImportTransport::new(endpoint.base_url(), self.request_timeout)?;
        Ok(Arc::new(HttpImportClient::new(
            instance.name(),
            Arc::new(transport),
        )))
    }
}
