use crate::features::observability::repo::ObservabilityRepository;
use crate::features::observability::service::ObservabilityService;
use crate::shared::error::{OrchestratorError, OrchestratorResult};
use std::sync::Arc;

/// Owns the prometheus registry of one orchestrator.
pub struct ObservabilityController {
    service: ObservabilityService,
}

impl ObservabilityController {
    pub fn new(service: ObservabilityService) -> Self {
        Self { service }
    }

    /// Builds a controller backed by a fresh registry.
    pub fn with_new_registry() -> OrchestratorResult<Self> {
        let repo = ObservabilityRepository::new().map_err(OrchestratorError::Metrics)?;
        Ok(Self::new(ObservabilityService::new(Arc::new(repo))))
    }

    pub fn record_provisioned(&self) {
        self.service.record_provisioned();
    }

    pub fn record_failed(&self) {
        self.service.record_failed();
    }

    pub fn record_remote_call(&self, operation: &str, success: bool) {
        self.service.record_remote_call(operation, success);
    }

    pub fn record_readiness_wait(&self, seconds: f64) {
        self.service.record_readiness_wait(seconds);
    }

    pub fn remote_call_count(&self, operation: &str, success: bool) -> f64 {
        self.service.remote_call_count(operation, success)
    }

    pub fn instances_provisioned(&self) -> f64 {
        self.service.instances_provisioned()
    }

    pub fn instances_failed(&self) -> f64 {
        self.service.instances_failed()
    }

    pub fn render_metrics(&self) -> OrchestratorResult<String> {
        self.service
            .render_metrics()
            .map_err(OrchestratorError::Metrics)
    }
}
