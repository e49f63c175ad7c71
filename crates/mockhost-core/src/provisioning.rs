//! Provisioning lifecycle of a managed instance and the recorder that keeps
//! its history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Ordered provisioning steps. Each step finishes before the next starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    Secrets,
    MainArtifacts,
    SecondaryArtifacts,
    MainRemoteArtifacts,
    SecondaryRemoteArtifacts,
    Snapshots,
}

impl ProvisioningStep {
    pub const ORDERED: [ProvisioningStep; 6] = [
        ProvisioningStep::Secrets,
        ProvisioningStep::MainArtifacts,
        ProvisioningStep::SecondaryArtifacts,
        ProvisioningStep::MainRemoteArtifacts,
        ProvisioningStep::SecondaryRemoteArtifacts,
        ProvisioningStep::Snapshots,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secrets => "secrets",
            Self::MainArtifacts => "main_artifacts",
            Self::SecondaryArtifacts => "secondary_artifacts",
            Self::MainRemoteArtifacts => "main_remote_artifacts",
            Self::SecondaryRemoteArtifacts => "secondary_remote_artifacts",
            Self::Snapshots => "snapshots",
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ProvisioningState {
    Created,
    AwaitingHealth,
    Provisioning { step: ProvisioningStep },
    Provisioned,
    Failed { reason: String },
    Cancelled,
}

impl ProvisioningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Provisioned | Self::Failed { .. } | Self::Cancelled
        )
    }

    pub fn is_provisioned(&self) -> bool {
        matches!(self, Self::Provisioned)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingHealth => "awaiting_health",
            Self::Provisioning { .. } => "provisioning",
            Self::Provisioned => "provisioned",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub instance: String,
    pub state: ProvisioningState,
    pub timestamp: DateTime<Utc>,
    pub details: Option<HashMap<String, String>>,
}

impl ProvisioningEvent {
    pub fn new(instance: impl Into<String>, state: ProvisioningState) -> Self {
        Self {
            instance: instance.into(),
            state,
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Records state transitions of every managed instance in arrival order
#[derive(Debug, Default)]
pub struct ProvisioningEventRecorder {
    events: Vec<ProvisioningEvent>,
}

impl ProvisioningEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: ProvisioningEvent) {
        self.events.push(event);
    }

    pub fn record_transition(&mut self, instance: &str, state: ProvisioningState) {
        self.record_event(ProvisioningEvent::new(instance, state));
    }

    pub fn record_call(&mut self, instance: &str, step: ProvisioningStep, target: &str) {
        let mut details = HashMap::new();
        details.insert("target".to_string(), target.to_string());
        self.record_event(
            ProvisioningEvent::new(instance, ProvisioningState::Provisioning { step })
                .with_details(details),
        );
    }

    pub fn get_events(&self) -> &[ProvisioningEvent] {
        &self.events
    }

    pub fn get_events_for_instance(&self, instance: &str) -> Vec<&ProvisioningEvent> {
        self.events
            .iter()
            .filter(|e| e.instance == instance)
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
