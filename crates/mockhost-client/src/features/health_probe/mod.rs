use crate::{ClientError, ClientResult, HealthProbe};
use async_trait::async_trait;
use mockhost_core::AllocatedEndpoint;
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_HEALTH_PATH: &str = "/api/health";

/// Reports an instance healthy when its health path answers with a 2xx.
pub struct HttpHealthProbe {
    client: Client,
    path: String,
}

impl HttpHealthProbe {
    pub fn new(path: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let path: String = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Ok(Self { client, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn is_healthy(&self, endpoint: &AllocatedEndpoint) -> bool {
        let url = format!("{}{}", endpoint.base_url(), self.path);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                trace!(url = %url, error = %e, "Health probe failed");
                false
            }
        }
    }
}
