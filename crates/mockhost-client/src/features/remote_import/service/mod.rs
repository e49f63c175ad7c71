use crate::features::remote_import::repo::{ImportBody, ImportRequest, ImportResponse, ImportTransport};
use crate::{ClientError, ClientResult, ImportClient, ImportOperation};
use async_trait::async_trait;
use mockhost_core::ResolvedSecret;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const UPLOAD_PATH: &str = "/api/artifact/upload";
const DOWNLOAD_PATH: &str = "/api/artifact/download";
const IMPORT_PATH: &str = "/api/import";
const SECRETS_PATH: &str = "/api/secrets";

/// Import client speaking the mock service's REST API for one instance.
pub struct HttpImportClient {
    instance: String,
    transport: Arc<dyn ImportTransport>,
}

impl HttpImportClient {
    pub fn new(instance: impl Into<String>, transport: Arc<dyn ImportTransport>) -> Self {
        Self {
            instance: instance.into(),
            transport,
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    async fn execute(&self, request: ImportRequest, cancel: &CancellationToken) -> ClientResult<()> {
        let operation = request.operation;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled(operation)),
            response = self.transport.send(request) => response?,
        };
        check_status(operation, response)?;
        debug!(instance = %self.instance, operation = %operation, "Remote call completed");
        Ok(())
    }
}

#[async_trait]
impl ImportClient for HttpImportClient {
    async fn import_artifact(
        &self,
        path: &Path,
        main_artifact: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let operation = ImportOperation::UploadArtifact;
        let body = read_file_part(operation, path, cancel).await?;
        self.execute(
            ImportRequest {
                operation,
                path: UPLOAD_PATH.to_string(),
                query: vec![("mainArtifact".to_string(), main_artifact.to_string())],
                body,
            },
            cancel,
        )
        .await
    }

    async fn import_remote_artifact(
        &self,
        url: &str,
        main_artifact: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.execute(
            ImportRequest {
                operation: ImportOperation::ImportRemoteArtifact,
                path: DOWNLOAD_PATH.to_string(),
                query: Vec::new(),
                body: ImportBody::Form(vec![
                    ("mainArtifact".to_string(), main_artifact.to_string()),
                    ("url".to_string(), url.to_string()),
                ]),
            },
            cancel,
        )
        .await
    }

    async fn import_snapshot(&self, path: &Path, cancel: &CancellationToken) -> ClientResult<()> {
        let operation = ImportOperation::ImportSnapshot;
        let body = read_file_part(operation, path, cancel).await?;
        self.execute(
            ImportRequest {
                operation,
                path: IMPORT_PATH.to_string(),
                query: Vec::new(),
                body,
            },
            cancel,
        )
        .await
    }

    async fn create_secret(
        &self,
        secret: &ResolvedSecret,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let body =
            serde_json::to_value(secret).map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.execute(
            ImportRequest {
                operation: ImportOperation::CreateSecret,
                path: SECRETS_PATH.to_string(),
                query: Vec::new(),
                body: ImportBody::Json(body),
            },
            cancel,
        )
        .await
    }
}

async fn read_file_part(
    operation: ImportOperation,
    path: &Path,
    cancel: &CancellationToken,
) -> ClientResult<ImportBody> {
    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ClientError::Cancelled(operation)),
        bytes = tokio::fs::read(path) => bytes.map_err(|e| ClientError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?,
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());

    Ok(ImportBody::Multipart {
        field: "file".to_string(),
        file_name,
        bytes,
    })
}

fn check_status(operation: ImportOperation, response: ImportResponse) -> ClientResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ClientError::UnexpectedStatus {
            operation,
            status: response.status,
            body: response.body,
        })
    }
}
