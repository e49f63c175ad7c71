use crate::features::observability::controller::ObservabilityController;
use crate::features::provisioning::repo::ProvisioningStatusRepository;
use crate::features::provisioning::service::ProvisioningService;
use crate::features::readiness::repo::ResourceNotifier;
use crate::features::readiness::service::ReadinessGate;
use crate::shared::error::{OrchestratorError, OrchestratorResult};
use crate::shared::types::{ExecutionMode, InstanceOutcome, ProvisioningReport, Topology};
use mockhost_client::ImportClientFactory;
use mockhost_core::{ProvisioningEvent, ProvisioningState};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Post-provisioning orchestrator.
///
/// Constructed once with its collaborators and invoked through [`run`] after
/// the hosting layer has created the resources of a topology. Holds a
/// shutdown token for its whole lifetime; every run is additionally bound to
/// the token its caller supplies.
///
/// [`run`]: ProvisioningOrchestrator::run
pub struct ProvisioningOrchestrator {
    mode: ExecutionMode,
    service: Arc<ProvisioningService>,
    status: Arc<ProvisioningStatusRepository>,
    observability: Arc<ObservabilityController>,
    shutdown: CancellationToken,
}

impl ProvisioningOrchestrator {
    pub fn new(
        mode: ExecutionMode,
        notifier: Arc<dyn ResourceNotifier>,
        clients: Arc<dyn ImportClientFactory>,
    ) -> OrchestratorResult<Self> {
        let observability = Arc::new(ObservabilityController::with_new_registry()?);
        Ok(Self::with_observability(
            mode,
            notifier,
            clients,
            observability,
        ))
    }

    pub fn with_observability(
        mode: ExecutionMode,
        notifier: Arc<dyn ResourceNotifier>,
        clients: Arc<dyn ImportClientFactory>,
        observability: Arc<ObservabilityController>,
    ) -> Self {
        let status = Arc::new(ProvisioningStatusRepository::new());
        let gate = ReadinessGate::new(notifier, observability.clone());
        let service = Arc::new(ProvisioningService::new(
            gate,
            clients,
            status.clone(),
            observability.clone(),
        ));

        Self {
            mode,
            service,
            status,
            observability,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn observability(&self) -> &Arc<ObservabilityController> {
        &self.observability
    }

    /// Provisions every managed instance of `topology` concurrently.
    ///
    /// Returns once every instance task has ended. Per-instance failures and
    /// cancellation are reported in the returned report, never as an error.
    pub async fn run(&self, topology: &Topology, cancel: CancellationToken) -> ProvisioningReport {
        let run_id = Uuid::new_v4();

        if self.mode == ExecutionMode::Publish {
            info!(run_id = %run_id, "Publish mode, skipping provisioning");
            return ProvisioningReport::skipped(run_id);
        }

        let span = info_span!("provisioning_run", run_id = %run_id);
        self.run_instances(run_id, topology, cancel)
            .instrument(span)
            .await
    }

    async fn run_instances(
        &self,
        run_id: Uuid,
        topology: &Topology,
        cancel: CancellationToken,
    ) -> ProvisioningReport {
        for (instance, dependency) in topology.unresolved_dependencies() {
            warn!(instance = %instance, dependency = %dependency, "Startup dependency is not part of the topology");
        }

        let run_token = self.shutdown.child_token();
        // Cancelled when this run ends, which also stops the linker below.
        let _run_guard = run_token.clone().drop_guard();
        {
            let linked = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => linked.cancel(),
                    _ = linked.cancelled() => {}
                }
            });
        }

        let instances = topology.managed_instances();
        info!(instances = instances.len(), "Starting provisioning");

        let mut tasks = JoinSet::new();
        for instance in instances {
            let instance = instance.clone();
            let service = self.service.clone();
            let token = run_token.clone();
            let span = info_span!("instance", instance = %instance.name());
            tasks.spawn(
                async move {
                    let outcome = service.provision(&instance, &token).await;
                    (instance.name().to_string(), outcome)
                }
                .instrument(span),
            );
        }

        let mut report = ProvisioningReport::new(run_id);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    report.outcomes.insert(name, outcome);
                }
                Err(e) => error!(error = %e, "Provisioning task ended abnormally"),
            }
        }

        for instance in instances {
            if !report.outcomes.contains_key(instance.name()) {
                self.status.transition(
                    instance.name(),
                    ProvisioningState::Failed {
                        reason: "provisioning task aborted".to_string(),
                    },
                );
                report
                    .outcomes
                    .insert(instance.name().to_string(), InstanceOutcome::Aborted);
            }
        }

        info!(
            provisioned = report.provisioned_count(),
            total = report.outcomes.len(),
            "Provisioning run finished"
        );
        report
    }

    /// Observable provisioning state of one instance.
    pub fn subscribe(&self, instance: &str) -> watch::Receiver<ProvisioningState> {
        self.status.subscribe(instance)
    }

    pub fn state(&self, instance: &str) -> Option<ProvisioningState> {
        self.status.state(instance)
    }

    pub fn events(&self, instance: &str) -> Vec<ProvisioningEvent> {
        self.status.events_for(instance)
    }

    /// Resolves once `instance` is fully configured.
    ///
    /// A failed or abandoned instance never resolves; the wait only ends
    /// early when `cancel` or the orchestrator's shutdown fires.
    pub async fn wait_until_configured(
        &self,
        instance: &str,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        let mut receiver = self.subscribe(instance);
        if receiver.borrow().is_provisioned() {
            return Ok(());
        }
        let configured = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.shutdown.cancelled() => false,
            configured = provisioned(&mut receiver) => configured,
        };

        if configured {
            Ok(())
        } else {
            Err(OrchestratorError::Cancelled(format!(
                "wait for '{instance}' to be configured"
            )))
        }
    }

    /// Fires the shutdown token. Safe to call repeatedly and before any run.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down provisioning orchestrator");
        }
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for ProvisioningOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn provisioned(receiver: &mut watch::Receiver<ProvisioningState>) -> bool {
    receiver
        .wait_for(ProvisioningState::is_provisioned)
        .await
        .is_ok()
}
