use crate::{ClientError, ClientResult, ImportOperation};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ImportBody {
    Multipart {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub operation: ImportOperation,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: ImportBody,
}

#[derive(Debug, Clone)]
pub struct ImportResponse {
    pub status: u16,
    pub body: String,
}

impl ImportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends prepared requests to the mock service's REST API.
#[async_trait]
pub trait ImportTransport: Send + Sync {
    async fn send(&self, request: ImportRequest) -> ClientResult<ImportResponse>;
}

pub struct ReqwestImportTransport {
    client: Client,
    base_url: String,
}

impl ReqwestImportTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ImportTransport for ReqwestImportTransport {
    async fn send(&self, request: ImportRequest) -> ClientResult<ImportResponse> {
        let operation = request.operation;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.post(&url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            ImportBody::Multipart {
                field,
                file_name,
                bytes,
            } => builder.multipart(Form::new().part(field, Part::bytes(bytes).file_name(file_name))),
            ImportBody::Form(pairs) => builder.form(&pairs),
            ImportBody::Json(value) => builder.json(&value),
        };

        let response = builder.send().await.map_err(|e| ClientError::Transport {
            operation,
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ClientError::Transport {
            operation,
            message: format!("failed to read response body: {e}"),
        })?;

        Ok(ImportResponse { status, body })
    }
}
