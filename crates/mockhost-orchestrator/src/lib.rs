pub mod config;
pub mod features;
pub mod shared;

pub use config::{OrchestratorConfig, TopologyFile};
pub use features::observability::controller::ObservabilityController;
pub use features::provisioning::controller::ProvisioningOrchestrator;
pub use features::readiness::repo::{
    InMemoryResourceNotifier, PollingResourceNotifier, ResourceNotifier,
};
pub use features::readiness::service::{ReadinessGate, Ready};
pub use shared::error::{OrchestratorError, OrchestratorResult, ReadinessFailure};
pub use shared::types::{InstanceOutcome, ProvisioningReport};
