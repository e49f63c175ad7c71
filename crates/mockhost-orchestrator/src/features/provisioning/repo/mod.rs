use mockhost_core::{
    ProvisioningEvent, ProvisioningEventRecorder, ProvisioningState, ProvisioningStep,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// Observable provisioning state per instance plus the transition history.
///
/// Entries are created on first use, so callers may subscribe to an instance
/// before the first run has registered it.
#[derive(Default)]
pub struct ProvisioningStatusRepository {
    states: RwLock<HashMap<String, watch::Sender<ProvisioningState>>>,
    recorder: Mutex<ProvisioningEventRecorder>,
}

impl ProvisioningStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new sequence for `instance`, resetting any previous state.
    pub fn register(&self, instance: &str) {
        self.transition(instance, ProvisioningState::Created);
    }

    pub fn transition(&self, instance: &str, state: ProvisioningState) {
        debug!(instance = %instance, state = state.label(), "Provisioning state changed");
        self.recorder().record_transition(instance, state.clone());
        self.with_sender(instance, |sender| {
            sender.send_replace(state);
        });
    }

    pub fn record_call(&self, instance: &str, step: ProvisioningStep, target: &str) {
        self.recorder().record_call(instance, step, target);
    }

    pub fn subscribe(&self, instance: &str) -> watch::Receiver<ProvisioningState> {
        self.with_sender(instance, |sender| sender.subscribe())
    }

    pub fn state(&self, instance: &str) -> Option<ProvisioningState> {
        let states = self
            .states
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        states.get(instance).map(|sender| sender.borrow().clone())
    }

    pub fn events_for(&self, instance: &str) -> Vec<ProvisioningEvent> {
        self.recorder()
            .get_events_for_instance(instance)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<ProvisioningEvent> {
        self.recorder().get_events().to_vec()
    }

    fn with_sender<T>(
        &self,
        instance: &str,
        f: impl FnOnce(&watch::Sender<ProvisioningState>) -> T,
    ) -> T {
        {
            let states = self
                .states
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(sender) = states.get(instance) {
                return f(sender);
            }
        }

        let mut states = self
            .states
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = states
            .entry(instance.to_string())
            .or_insert_with(|| watch::channel(ProvisioningState::Created).0);
        f(sender)
    }

    fn recorder(&self) -> MutexGuard<'_, ProvisioningEventRecorder> {
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
