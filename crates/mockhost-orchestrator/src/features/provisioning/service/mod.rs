use crate::features::observability::controller::ObservabilityController;
use crate::features::provisioning::repo::ProvisioningStatusRepository;
use crate::features::readiness::service::ReadinessGate;
use crate::shared::error::{OrchestratorError, OrchestratorResult, ReadinessFailure};
use crate::shared::types::InstanceOutcome;
use mockhost_client::{ClientError, ClientResult, ImportClient, ImportClientFactory, ImportOperation};
use mockhost_core::{
    ArtifactLocation, ArtifactReference, ManagedServiceInstance, ProvisioningState,
    ProvisioningStep,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the readiness wait and the ordered import sequence for one instance.
pub struct ProvisioningService {
    gate: ReadinessGate,
    clients: Arc<dyn ImportClientFactory>,
    status: Arc<ProvisioningStatusRepository>,
    observability: Arc<ObservabilityController>,
}

impl ProvisioningService {
    pub fn new(
        gate: ReadinessGate,
        clients: Arc<dyn ImportClientFactory>,
        status: Arc<ProvisioningStatusRepository>,
        observability: Arc<ObservabilityController>,
    ) -> Self {
        Self {
            gate,
            clients,
            status,
            observability,
        }
    }

    /// Provisions `instance` and reports how it ended. Never panics on a
    /// remote or readiness failure; those end this instance only.
    pub async fn provision(
        &self,
        instance: &ManagedServiceInstance,
        cancel: &CancellationToken,
    ) -> InstanceOutcome {
        let name = instance.name();
        self.status.register(name);
        self.status
            .transition(name, ProvisioningState::AwaitingHealth);

        if let Err(failure) = self.gate.await_healthy(instance, cancel).await {
            return match failure {
                ReadinessFailure::Cancelled(_) => self.cancelled(name),
                ReadinessFailure::Failed { .. } => {
                    warn!(instance = %name, reason = %failure, "Instance never became healthy, skipping provisioning");
                    self.status.transition(
                        name,
                        ProvisioningState::Failed {
                            reason: failure.to_string(),
                        },
                    );
                    InstanceOutcome::NotReady {
                        reason: failure.to_string(),
                    }
                }
            };
        }

        let Some(endpoint) = instance.endpoint().allocated() else {
            warn!(instance = %name, "Instance reported healthy without an allocated endpoint, skipping provisioning");
            self.status.transition(
                name,
                ProvisioningState::Failed {
                    reason: "endpoint not allocated".to_string(),
                },
            );
            return InstanceOutcome::EndpointUnallocated;
        };

        let client = match self.clients.create(instance, endpoint) {
            Ok(client) => client,
            Err(e) => {
                error!(instance = %name, error = %e, "Failed to create import client");
                self.observability.record_failed();
                self.status.transition(
                    name,
                    ProvisioningState::Failed {
                        reason: e.to_string(),
                    },
                );
                return InstanceOutcome::ClientUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        for step in ProvisioningStep::ORDERED {
            if cancel.is_cancelled() {
                return self.cancelled(name);
            }
            self.status
                .transition(name, ProvisioningState::Provisioning { step });

            if let Err(err) = self.run_step(instance, step, client.as_ref(), cancel).await {
                if err.is_cancelled() {
                    return self.cancelled(name);
                }
                error!(instance = %name, step = %step, error = %err, "Provisioning step failed");
                self.observability.record_failed();
                self.status.transition(
                    name,
                    ProvisioningState::Failed {
                        reason: err.to_string(),
                    },
                );
                return InstanceOutcome::Failed {
                    step,
                    error: err.to_string(),
                };
            }
        }

        self.status.transition(name, ProvisioningState::Provisioned);
        self.observability.record_provisioned();
        info!(instance = %name, endpoint = %endpoint.base_url(), "Instance fully configured");
        InstanceOutcome::Provisioned
    }

    async fn run_step(
        &self,
        instance: &ManagedServiceInstance,
        step: ProvisioningStep,
        client: &dyn ImportClient,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        let name = instance.name();
        match step {
            ProvisioningStep::Secrets => {
                for secret in instance.secrets() {
                    let resolved = secret.resolve(cancel).await?;
                    self.call(
                        name,
                        step,
                        secret.name(),
                        ImportOperation::CreateSecret,
                        cancel,
                        client.create_secret(&resolved, cancel),
                    )
                    .await?;
                }
            }
            ProvisioningStep::MainArtifacts => {
                self.import_all(name, step, instance.main_artifacts(), client, cancel)
                    .await?
            }
            ProvisioningStep::SecondaryArtifacts => {
                self.import_all(name, step, instance.secondary_artifacts(), client, cancel)
                    .await?
            }
            ProvisioningStep::MainRemoteArtifacts => {
                self.import_all(name, step, instance.main_remote_artifacts(), client, cancel)
                    .await?
            }
            ProvisioningStep::SecondaryRemoteArtifacts => {
                self.import_all(
                    name,
                    step,
                    instance.secondary_remote_artifacts(),
                    client,
                    cancel,
                )
                .await?
            }
            ProvisioningStep::Snapshots => {
                for snapshot in instance.snapshots() {
                    let target = snapshot.path.display().to_string();
                    self.call(
                        name,
                        step,
                        &target,
                        ImportOperation::ImportSnapshot,
                        cancel,
                        client.import_snapshot(&snapshot.path, cancel),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn import_all(
        &self,
        instance: &str,
        step: ProvisioningStep,
        artifacts: &[ArtifactReference],
        client: &dyn ImportClient,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<()> {
        for artifact in artifacts {
            let target = artifact.display_target();
            let main = artifact.role.is_main();
            match &artifact.location {
                ArtifactLocation::File(path) => {
                    self.call(
                        instance,
                        step,
                        &target,
                        ImportOperation::UploadArtifact,
                        cancel,
                        client.import_artifact(path, main, cancel),
                    )
                    .await?
                }
                ArtifactLocation::Url(url) => {
                    self.call(
                        instance,
                        step,
                        &target,
                        ImportOperation::ImportRemoteArtifact,
                        cancel,
                        client.import_remote_artifact(url, main, cancel),
                    )
                    .await?
                }
            }
        }
        Ok(())
    }

    /// Issues one remote call, racing it against cancellation.
    async fn call<F>(
        &self,
        instance: &str,
        step: ProvisioningStep,
        target: &str,
        operation: ImportOperation,
        cancel: &CancellationToken,
        request: F,
    ) -> OrchestratorResult<()>
    where
        F: Future<Output = ClientResult<()>> + Send,
    {
        self.status.record_call(instance, step, target);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled(operation)),
            result = request => result,
        };

        match result {
            Ok(()) => {
                self.observability
                    .record_remote_call(operation.as_str(), true);
                debug!(instance = %instance, step = %step, target = %target, "Remote call succeeded");
                Ok(())
            }
            Err(source) => {
                if !source.is_cancelled() {
                    self.observability
                        .record_remote_call(operation.as_str(), false);
                }
                Err(OrchestratorError::RemoteCall { step, source })
            }
        }
    }

    fn cancelled(&self, instance: &str) -> InstanceOutcome {
        info!(instance = %instance, "Provisioning cancelled");
        self.status.transition(instance, ProvisioningState::Cancelled);
        InstanceOutcome::Cancelled
    }
}
