use super::ResourceNotifier;
use crate::shared::error::ReadinessFailure;
use async_trait::async_trait;
use mockhost_client::HealthProbe;
use mockhost_core::{EndpointSlot, Topology};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
enum PollTarget {
    /// Managed instance checked through its HTTP health endpoint once the
    /// endpoint is allocated.
    Http {
        endpoint: EndpointSlot,
        probe: Arc<dyn HealthProbe>,
    },
    /// Broker considered healthy once it accepts TCP connections.
    Tcp { host: String, port: u16 },
}

/// Notifier that actively polls resources on a fixed interval.
///
/// Polling cannot observe a terminal state, so waits end either healthy or
/// cancelled.
pub struct PollingResourceNotifier {
    targets: HashMap<String, PollTarget>,
    interval: Duration,
}

impl PollingResourceNotifier {
    pub fn new(interval: Duration) -> Self {
        Self {
            targets: HashMap::new(),
            interval,
        }
    }

    /// Registers every managed instance as an HTTP target and every broker as
    /// a TCP target.
    pub fn from_topology(
        topology: &Topology,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
    ) -> Self {
        let mut notifier = Self::new(interval);
        for instance in topology.managed_instances() {
            notifier = notifier.with_http_target(
                instance.name(),
                instance.endpoint().clone(),
                probe.clone(),
            );
        }
        for broker in topology.brokers() {
            notifier = notifier.with_tcp_target(&broker.name, &broker.host, broker.port);
        }
        notifier
    }

    pub fn with_http_target(
        mut self,
        name: impl Into<String>,
        endpoint: EndpointSlot,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        self.targets
            .insert(name.into(), PollTarget::Http { endpoint, probe });
        self
    }

    pub fn with_tcp_target(mut self, name: impl Into<String>, host: &str, port: u16) -> Self {
        self.targets.insert(
            name.into(),
            PollTarget::Tcp {
                host: host.to_string(),
                port,
            },
        );
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn is_healthy(target: &PollTarget) -> bool {
        match target {
            PollTarget::Http { endpoint, probe } => match endpoint.allocated() {
                Some(allocated) => probe.is_healthy(allocated).await,
                None => false,
            },
            PollTarget::Tcp { host, port } => {
                TcpStream::connect((host.as_str(), *port)).await.is_ok()
            }
        }
    }
}

#[async_trait]
impl ResourceNotifier for PollingResourceNotifier {
    async fn wait_for_healthy(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReadinessFailure> {
        let Some(target) = self.targets.get(name) else {
            warn!(resource = %name, "No poll target registered, waiting for cancellation");
            cancel.cancelled().await;
            return Err(ReadinessFailure::Cancelled(name.to_string()));
        };

        loop {
            let healthy = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReadinessFailure::Cancelled(name.to_string())),
                healthy = Self::is_healthy(target) => healthy,
            };
            if healthy {
                debug!(resource = %name, "Resource reported healthy");
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReadinessFailure::Cancelled(name.to_string())),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
