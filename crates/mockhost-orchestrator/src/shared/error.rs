use mockhost_client::ClientError;
use mockhost_core::{CoreError, ErrorResponse, ProvisioningStep, ResourceState};
use thiserror::Error;

/// Why a readiness wait ended without the resource becoming healthy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessFailure {
    #[error("resource '{resource}' reached terminal state {state:?}")]
    Failed {
        resource: String,
        state: ResourceState,
    },
    #[error("readiness wait for '{0}' was cancelled")]
    Cancelled(String),
}

impl ReadinessFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Orchestrator specific errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Readiness failure: {0}")]
    Readiness(#[from] ReadinessFailure),
    #[error("Remote call failed during {step}: {source}")]
    RemoteCall {
        step: ProvisioningStep,
        #[source]
        source: ClientError,
    },
    #[error("Client unavailable: {0}")]
    ClientUnavailable(String),
    #[error("Value resolution failed: {0}")]
    ValueResolution(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Metrics error: {0}")]
    Metrics(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Cancellation is graceful abandonment, not a fault.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::Readiness(failure) => failure.is_cancelled(),
            Self::RemoteCall { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cancelled(msg) => Self::Cancelled(msg),
            CoreError::ValueResolution(msg) => Self::ValueResolution(msg),
            CoreError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Configuration(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for ErrorResponse {
    fn from(err: OrchestratorError) -> Self {
        let code = match &err {
            OrchestratorError::Configuration(_) => "CONFIGURATION_ERROR",
            OrchestratorError::Readiness(_) => "READINESS_FAILURE",
            OrchestratorError::RemoteCall { .. } => "REMOTE_CALL_FAILURE",
            OrchestratorError::ClientUnavailable(_) => "CLIENT_UNAVAILABLE",
            OrchestratorError::ValueResolution(_) => "VALUE_RESOLUTION_ERROR",
            OrchestratorError::Cancelled(_) => "CANCELLED",
            OrchestratorError::Metrics(_) => "METRICS_ERROR",
            OrchestratorError::Io(_) => "IO_ERROR",
        };

        ErrorResponse::new(code, err.to_string())
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
