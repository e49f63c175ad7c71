pub mod polling;

use crate::shared::error::ReadinessFailure;
use async_trait::async_trait;
use mockhost_core::ResourceState;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use polling::PollingResourceNotifier;

/// Resource-notification collaborator. Resolves once the named resource is
/// healthy, fails as soon as it reaches a terminal state, and never applies
/// a timeout of its own.
#[async_trait]
pub trait ResourceNotifier: Send + Sync {
    async fn wait_for_healthy(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReadinessFailure>;
}

/// Notifier fed by explicit state publications from the hosting layer.
///
/// Resources nobody has published yet are considered `Starting`.
#[derive(Default)]
pub struct InMemoryResourceNotifier {
    resources: Mutex<HashMap<String, watch::Sender<ResourceState>>>,
}

impl InMemoryResourceNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, name: &str, state: ResourceState) {
        let mut resources = self.lock();
        match resources.get(name) {
            Some(sender) => {
                sender.send_replace(state);
            }
            None => {
                let (sender, _) = watch::channel(state);
                resources.insert(name.to_string(), sender);
            }
        }
    }

    pub fn state(&self, name: &str) -> Option<ResourceState> {
        self.lock().get(name).map(|sender| *sender.borrow())
    }

    fn subscribe(&self, name: &str) -> watch::Receiver<ResourceState> {
        self.lock()
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(ResourceState::Starting).0)
            .subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<ResourceState>>> {
        self.resources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn settled_state(receiver: &mut watch::Receiver<ResourceState>) -> Option<ResourceState> {
    receiver
        .wait_for(|state| *state == ResourceState::Healthy || state.is_terminal())
        .await
        .ok()
        .map(|state| *state)
}

#[async_trait]
impl ResourceNotifier for InMemoryResourceNotifier {
    async fn wait_for_healthy(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReadinessFailure> {
        let mut receiver = self.subscribe(name);

        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadinessFailure::Cancelled(name.to_string())),
            settled = settled_state(&mut receiver) => settled,
        };

        match settled {
            Some(ResourceState::Healthy) => Ok(()),
            Some(state) => Err(ReadinessFailure::Failed {
                resource: name.to_string(),
                state,
            }),
            // The sender lives as long as the notifier, so this only happens
            // while the notifier is being torn down.
            None => Err(ReadinessFailure::Cancelled(name.to_string())),
        }
    }
}
