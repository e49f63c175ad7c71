pub mod artifact;
pub mod connection;
pub mod instance;
pub mod names;
pub mod provisioning;
pub mod secret;
pub mod value;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

pub use artifact::{ArtifactLocation, ArtifactReference, ArtifactRole, SnapshotReference};
pub use connection::{
    compose, ComposedConnection, EnvironmentDescriptor, MessagingConnection, ProtocolAccumulator,
    TransportKind,
};
pub use instance::{
    AllocatedEndpoint, BrokerResource, EndpointSlot, ManagedServiceBuilder,
    ManagedServiceInstance, Topology,
};
pub use names::derive_topic;
pub use provisioning::{
    ProvisioningEvent, ProvisioningEventRecorder, ProvisioningState, ProvisioningStep,
};
pub use secret::{ResolvedSecret, SecretDescriptor, SecretDescriptorBuilder};
pub use value::{EnvVarSource, LiteralSource, ParameterHandle, ParameterSource, ValueSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Value resolution error: {0}")]
    ValueResolution(String),
    #[error("Endpoint error: {0}")]
    Endpoint(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Whether the hosting application is actually running resources or only
/// emitting a deployment manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Run,
    Publish,
}

impl FromStr for ExecutionMode {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(Self::Run),
            "publish" => Ok(Self::Publish),
            other => Err(CoreError::configuration(format!(
                "unknown execution mode '{other}', expected 'run' or 'publish'"
            ))),
        }
    }
}

/// Lifecycle state reported by the hosting layer for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Starting,
    Running,
    Healthy,
    Unhealthy,
    Exited,
}

impl ResourceState {
    /// Terminal states never transition to `Healthy` again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unhealthy | Self::Exited)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<CoreError> for ErrorResponse {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::Configuration(_) => "CONFIGURATION_ERROR",
            CoreError::ValueResolution(_) => "VALUE_RESOLUTION_ERROR",
            CoreError::Endpoint(_) => "ENDPOINT_ERROR",
            CoreError::Cancelled(_) => "CANCELLED",
        };
        ErrorResponse::new(code, err.to_string())
    }
}
