use crate::features::observability::controller::ObservabilityController;
use crate::features::readiness::repo::ResourceNotifier;
use crate::shared::error::ReadinessFailure;
use mockhost_core::ManagedServiceInstance;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The awaited instance and all of its startup dependencies are healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub waited: Duration,
}

/// Blocks a provisioning sequence until its instance is healthy.
pub struct ReadinessGate {
    notifier: Arc<dyn ResourceNotifier>,
    observability: Arc<ObservabilityController>,
}

impl ReadinessGate {
    pub fn new(
        notifier: Arc<dyn ResourceNotifier>,
        observability: Arc<ObservabilityController>,
    ) -> Self {
        Self {
            notifier,
            observability,
        }
    }

    /// Waits for every startup dependency, in declaration order, while the
    /// instance itself is tracked alongside. The first failure on either
    /// side ends the wait.
    pub async fn await_healthy(
        &self,
        instance: &ManagedServiceInstance,
        cancel: &CancellationToken,
    ) -> Result<Ready, ReadinessFailure> {
        let started = Instant::now();

        let dependencies = async {
            for dependency in instance.dependencies() {
                debug!(instance = %instance.name(), dependency = %dependency, "Waiting for dependency");
                self.notifier.wait_for_healthy(dependency, cancel).await?;
            }
            Ok::<(), ReadinessFailure>(())
        };
        let own = self.notifier.wait_for_healthy(instance.name(), cancel);
        tokio::try_join!(dependencies, own)?;

        let waited = started.elapsed();
        self.observability
            .record_readiness_wait(waited.as_secs_f64());
        info!(
            instance = %instance.name(),
            waited_ms = waited.as_millis() as u64,
            "Instance is healthy"
        );
        Ok(Ready { waited })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::readiness::repo::InMemoryResourceNotifier;
    use mockhost_core::{BrokerResource, ResourceState, TransportKind};

    fn gate(notifier: Arc<InMemoryResourceNotifier>) -> ReadinessGate {
        ReadinessGate::new(
            notifier,
            Arc::new(ObservabilityController::with_new_registry().unwrap()),
        )
    }

    fn instance_with_mqtt(root: &std::path::Path) -> ManagedServiceInstance {
        let mosquitto = BrokerResource::new("mosquitto", TransportKind::Mqtt, 1883);
        ManagedServiceInstance::builder("microcks", root)
            .with_mqtt_connection(&mosquitto, None, None)
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_dependency_must_be_healthy_first() {
        let root = tempfile::tempdir().unwrap();
        let instance = instance_with_mqtt(root.path());
        let notifier = Arc::new(InMemoryResourceNotifier::new());
        notifier.publish("microcks", ResourceState::Healthy);

        let gate = gate(notifier.clone());
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move { gate.await_healthy(&instance, &cancel).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        notifier.publish("mosquitto", ResourceState::Healthy);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_failed_dependency_fails_instance() {
        let root = tempfile::tempdir().unwrap();
        let instance = instance_with_mqtt(root.path());
        let notifier = Arc::new(InMemoryResourceNotifier::new());
        notifier.publish("mosquitto", ResourceState::Unhealthy);
        notifier.publish("microcks", ResourceState::Healthy);

        let result = gate(notifier)
            .await_healthy(&instance, &CancellationToken::new())
            .await;
        assert_eq!(
            result,
            Err(ReadinessFailure::Failed {
                resource: "mosquitto".to_string(),
                state: ResourceState::Unhealthy,
            })
        );
    }

    #[tokio::test]
    async fn test_exited_instance_fails_while_dependency_starting() {
        let root = tempfile::tempdir().unwrap();
        let instance = instance_with_mqtt(root.path());
        let notifier = Arc::new(InMemoryResourceNotifier::new());
        notifier.publish("mosquitto", ResourceState::Starting);
        notifier.publish("microcks", ResourceState::Exited);

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            gate(notifier).await_healthy(&instance, &CancellationToken::new()),
        )
        .await
        .expect("gate should fail without waiting for the broker");
        assert_eq!(
            result,
            Err(ReadinessFailure::Failed {
                resource: "microcks".to_string(),
                state: ResourceState::Exited,
            })
        );
    }

    #[tokio::test]
    async fn test_kafka_instance_does_not_wait_for_broker() {
        let root = tempfile::tempdir().unwrap();
        let kafka = BrokerResource::new("kafka", TransportKind::Kafka, 9092);
        let instance = ManagedServiceInstance::builder("microcks", root.path())
            .with_kafka_connection(&kafka)
            .unwrap()
            .build()
            .unwrap();
        let notifier = Arc::new(InMemoryResourceNotifier::new());
        notifier.publish("microcks", ResourceState::Healthy);

        let ready = gate(notifier)
            .await_healthy(&instance, &CancellationToken::new())
            .await;
        assert!(ready.is_ok());
    }
}
