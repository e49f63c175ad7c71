pub use mockhost_core::{
    ExecutionMode, ManagedServiceInstance, ProvisioningState, ProvisioningStep, ResourceState,
    Topology,
};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// How the provisioning sequence of one instance ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum InstanceOutcome {
    Provisioned,
    NotReady { reason: String },
    EndpointUnallocated,
    ClientUnavailable { reason: String },
    Failed { step: ProvisioningStep, error: String },
    Cancelled,
    /// The instance task panicked or was aborted before reporting.
    Aborted,
}

impl InstanceOutcome {
    pub fn is_provisioned(&self) -> bool {
        matches!(self, Self::Provisioned)
    }

    /// Outcomes a caller should treat as a fault. Abandonment through
    /// cancellation or an unhealthy resource is not one.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::ClientUnavailable { .. } | Self::Aborted
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Provisioned => "provisioned",
            Self::NotReady { .. } => "not_ready",
            Self::EndpointUnallocated => "endpoint_unallocated",
            Self::ClientUnavailable { .. } => "client_unavailable",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for InstanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady { reason } | Self::ClientUnavailable { reason } => {
                write!(f, "{}: {}", self.label(), reason)
            }
            Self::Failed { step, error } => write!(f, "failed at {step}: {error}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of one orchestration run, keyed by instance name.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReport {
    pub run_id: Uuid,
    pub skipped: bool,
    pub outcomes: BTreeMap<String, InstanceOutcome>,
}

impl ProvisioningReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            skipped: false,
            outcomes: BTreeMap::new(),
        }
    }

    /// Report for a run that did no work, e.g. in publish mode.
    pub fn skipped(run_id: Uuid) -> Self {
        Self {
            skipped: true,
            ..Self::new(run_id)
        }
    }

    pub fn outcome(&self, instance: &str) -> Option<&InstanceOutcome> {
        self.outcomes.get(instance)
    }

    pub fn provisioned_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_provisioned()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.values().any(InstanceOutcome::is_failure)
    }
}
