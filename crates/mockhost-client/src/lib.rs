pub mod features;

use async_trait::async_trait;
use mockhost_core::{AllocatedEndpoint, ManagedServiceInstance, ResolvedSecret};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use features::health_probe::HttpHealthProbe;
pub use features::recording::{CallLog, RecordedCall, RecordingClientFactory, RecordingImportClient};
pub use features::remote_import::{HttpImportClient, HttpImportClientFactory};

/// Remote operations issued against a managed instance's REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportOperation {
    UploadArtifact,
    ImportRemoteArtifact,
    ImportSnapshot,
    CreateSecret,
}

impl ImportOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UploadArtifact => "upload_artifact",
            Self::ImportRemoteArtifact => "import_remote_artifact",
            Self::ImportSnapshot => "import_snapshot",
            Self::CreateSecret => "create_secret",
        }
    }
}

impl fmt::Display for ImportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(String),
    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },
    #[error("{operation} request failed: {message}")]
    Transport {
        operation: ImportOperation,
        message: String,
    },
    #[error("{operation} returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        operation: ImportOperation,
        status: u16,
        body: String,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("{0} was cancelled")]
    Cancelled(ImportOperation),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Import and secret operations against one managed instance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImportClient: Send + Sync {
    /// Uploads a local artifact file.
    async fn import_artifact(
        &self,
        path: &Path,
        main_artifact: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<()>;

    /// Asks the remote service to fetch an artifact by URL.
    async fn import_remote_artifact(
        &self,
        url: &str,
        main_artifact: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<()>;

    async fn import_snapshot(&self, path: &Path, cancel: &CancellationToken) -> ClientResult<()>;

    async fn create_secret(
        &self,
        secret: &ResolvedSecret,
        cancel: &CancellationToken,
    ) -> ClientResult<()>;
}

/// Builds a client scoped to one instance. Called once per instance per
/// orchestration run; clients are never shared between instances.
pub trait ImportClientFactory: Send + Sync {
    fn create(
        &self,
        instance: &ManagedServiceInstance,
        endpoint: &AllocatedEndpoint,
    ) -> ClientResult<Arc<dyn ImportClient>>;
}

/// Checks whether a managed instance answers on its health endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, endpoint: &AllocatedEndpoint) -> bool;
}
