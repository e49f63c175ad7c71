//! In-memory import client that records every call instead of sending it.
//!
//! Used for dry runs and for exercising orchestration without a live mock
//! service. Failures and latency can be injected per instance.

use crate::{ClientError, ClientResult, ImportClient, ImportClientFactory, ImportOperation};
use async_trait::async_trait;
use mockhost_core::{AllocatedEndpoint, ManagedServiceInstance, ResolvedSecret};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub instance: String,
    pub operation: ImportOperation,
    pub target: String,
}

/// Shared, ordered log of recorded calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: RecordedCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().clone()
    }

    pub fn calls_for(&self, instance: &str) -> Vec<RecordedCall> {
        self.lock()
            .iter()
            .filter(|call| call.instance == instance)
            .cloned()
            .collect()
    }

    pub fn targets_for(&self, instance: &str) -> Vec<String> {
        self.calls_for(instance)
            .into_iter()
            .map(|call| call.target)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct RecordingImportClient {
    instance: String,
    log: CallLog,
    failures: HashSet<ImportOperation>,
    delay: Option<Duration>,
}

impl RecordingImportClient {
    pub fn new(instance: impl Into<String>, log: CallLog) -> Self {
        Self {
            instance: instance.into(),
            log,
            failures: HashSet::new(),
            delay: None,
        }
    }

    pub fn failing_on(mut self, operation: ImportOperation) -> Self {
        self.failures.insert(operation);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn record(
        &self,
        operation: ImportOperation,
        target: String,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled(operation)),
                _ = tokio::time::sleep(delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(ClientError::Cancelled(operation));
        }

        self.log.push(RecordedCall {
            instance: self.instance.clone(),
            operation,
            target,
        });

        if self.failures.contains(&operation) {
            return Err(ClientError::UnexpectedStatus {
                operation,
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ImportClient for RecordingImportClient {
    async fn import_artifact(
        &self,
        path: &Path,
        _main_artifact: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.record(
            ImportOperation::UploadArtifact,
            path.display().to_string(),
            cancel,
        )
        .await
    }

    async fn import_remote_artifact(
        &self,
        url: &str,
        _main_artifact: bool,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.record(ImportOperation::ImportRemoteArtifact, url.to_string(), cancel)
            .await
    }

    async fn import_snapshot(&self, path: &Path, cancel: &CancellationToken) -> ClientResult<()> {
        self.record(
            ImportOperation::ImportSnapshot,
            path.display().to_string(),
            cancel,
        )
        .await
    }

    async fn create_secret(
        &self,
        secret: &ResolvedSecret,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.record(ImportOperation::CreateSecret, secret.name.clone(), cancel)
            .await
    }
}

/// Hands out recording clients sharing one [`CallLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingClientFactory {
    log: CallLog,
    failures: HashMap<String, HashSet<ImportOperation>>,
    delay: Option<Duration>,
}

impl RecordingClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn failing(mut self, instance: impl Into<String>, operation: ImportOperation) -> Self {
        self.failures
            .entry(instance.into())
            .or_default()
            .insert(operation);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl ImportClientFactory for RecordingClientFactory {
    fn create(
        &self,
        instance: &ManagedServiceInstance,
        _endpoint: &AllocatedEndpoint,
    ) -> ClientResult<Arc<dyn ImportClient>> {
        let mut client = RecordingImportClient::new(instance.name(), self.log.clone());
        if let Some(failures) = self.failures.get(instance.name()) {
            for operation in failures {
                client = client.failing_on(*operation);
            }
        }
        if let Some(delay) = self.delay {
            client = client.with_delay(delay);
        }
        Ok(Arc::new(client))
    }
}
