use crate::features::observability::repo::ObservabilityRepository;
use std::sync::Arc;

pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    pub fn record_provisioned(&self) {
        self.repo.inc_instances_provisioned();
    }

    pub fn record_failed(&self) {
        self.repo.inc_instances_failed();
    }

    pub fn record_remote_call(&self, operation: &str, success: bool) {
        let status = if success { "ok" } else { "error" };
        self.repo.observe_remote_call(operation, status);
    }

    pub fn record_readiness_wait(&self, seconds: f64) {
        self.repo.observe_readiness_wait(seconds);
    }

    pub fn remote_call_count(&self, operation: &str, success: bool) -> f64 {
        let status = if success { "ok" } else { "error" };
        self.repo.remote_call_count(operation, status)
    }

    pub fn instances_provisioned(&self) -> f64 {
        self.repo.instances_provisioned()
    }

    pub fn instances_failed(&self) -> f64 {
        self.repo.instances_failed()
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        self.repo.render_metrics()
    }
}
