use crate::artifact::{ArtifactReference, ArtifactRole, SnapshotReference};
use crate::connection::{compose, EnvironmentDescriptor, MessagingConnection, TransportKind};
use crate::names;
use crate::secret::SecretDescriptor;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Network address assigned to a resource by the hosting layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedEndpoint {
    pub host: String,
    pub port: u16,
}

impl AllocatedEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn rest_mock_url(&self, api_name: &str, api_version: &str) -> String {
        names::rest_mock_url(&self.base_url(), api_name, api_version)
    }

    pub fn soap_mock_url(&self, api_name: &str, api_version: &str) -> String {
        names::soap_mock_url(&self.base_url(), api_name, api_version)
    }

    pub fn graphql_mock_url(&self, api_name: &str, api_version: &str) -> String {
        names::graphql_mock_url(&self.base_url(), api_name, api_version)
    }

    pub fn grpc_mock_url(&self) -> String {
        format!("grpc://{}:{}", self.host, self.port)
    }

    pub fn validation_url(&self) -> String {
        names::validation_url(&self.base_url())
    }
}

/// Endpoint slot shared between a declaration and the hosting layer that
/// allocates it. Allocation happens at most once.
#[derive(Debug, Clone, Default)]
pub struct EndpointSlot {
    inner: Arc<OnceLock<AllocatedEndpoint>>,
}

impl EndpointSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, endpoint: AllocatedEndpoint) -> Result<()> {
        self.inner.set(endpoint).map_err(|rejected| {
            CoreError::Endpoint(format!(
                "endpoint already allocated, refusing {}:{}",
                rejected.host, rejected.port
            ))
        })
    }

    pub fn allocated(&self) -> Option<&AllocatedEndpoint> {
        self.inner.get()
    }

    pub fn is_allocated(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// A messaging broker running next to the managed instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerResource {
    pub name: String,
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
}

impl BrokerResource {
    pub fn new(name: impl Into<String>, kind: TransportKind, port: u16) -> Self {
        let name = name.into();
        Self {
            host: name.clone(),
            name,
            kind,
            port,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

/// A managed mock service instance and everything declared for it.
#[derive(Debug, Clone)]
pub struct ManagedServiceInstance {
    name: String,
    endpoint: EndpointSlot,
    main_artifacts: Vec<ArtifactReference>,
    secondary_artifacts: Vec<ArtifactReference>,
    main_remote_artifacts: Vec<ArtifactReference>,
    secondary_remote_artifacts: Vec<ArtifactReference>,
    secrets: Vec<SecretDescriptor>,
    snapshots: Vec<SnapshotReference>,
    environment: EnvironmentDescriptor,
    dependencies: Vec<String>,
}

impl ManagedServiceInstance {
    pub fn builder(name: impl Into<String>, app_root: impl Into<PathBuf>) -> ManagedServiceBuilder {
        ManagedServiceBuilder::new(name, app_root)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &EndpointSlot {
        &self.endpoint
    }

    pub fn main_artifacts(&self) -> &[ArtifactReference] {
        &self.main_artifacts
    }

    pub fn secondary_artifacts(&self) -> &[ArtifactReference] {
        &self.secondary_artifacts
    }

    pub fn main_remote_artifacts(&self) -> &[ArtifactReference] {
        &self.main_remote_artifacts
    }

    pub fn secondary_remote_artifacts(&self) -> &[ArtifactReference] {
        &self.secondary_remote_artifacts
    }

    pub fn secrets(&self) -> &[SecretDescriptor] {
        &self.secrets
    }

    pub fn snapshots(&self) -> &[SnapshotReference] {
        &self.snapshots
    }

    pub fn environment(&self) -> &EnvironmentDescriptor {
        &self.environment
    }

    /// Resources that must be healthy before this instance counts as ready.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

/// Collects declarations for a managed instance.
///
/// Each call validates immediately and returns the builder, so a
/// configuration error surfaces at the offending call.
#[derive(Debug)]
pub struct ManagedServiceBuilder {
    name: String,
    app_root: PathBuf,
    endpoint: EndpointSlot,
    main_artifacts: Vec<ArtifactReference>,
    secondary_artifacts: Vec<ArtifactReference>,
    main_remote_artifacts: Vec<ArtifactReference>,
    secondary_remote_artifacts: Vec<ArtifactReference>,
    secrets: Vec<SecretDescriptor>,
    snapshots: Vec<SnapshotReference>,
    steps: Vec<EnvironmentDescriptor>,
    dependencies: Vec<String>,
}

impl ManagedServiceBuilder {
    pub fn new(name: impl Into<String>, app_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            app_root: app_root.into(),
            endpoint: EndpointSlot::new(),
            main_artifacts: Vec::new(),
            secondary_artifacts: Vec::new(),
            main_remote_artifacts: Vec::new(),
            secondary_remote_artifacts: Vec::new(),
            secrets: Vec::new(),
            snapshots: Vec::new(),
            steps: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Shares an endpoint slot the hosting layer will allocate.
    pub fn with_endpoint(mut self, endpoint: EndpointSlot) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_main_artifacts<I, P>(mut self, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.main_artifacts
                .push(ArtifactReference::file(ArtifactRole::Main, path, &self.app_root)?);
        }
        Ok(self)
    }

    pub fn with_secondary_artifacts<I, P>(mut self, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.secondary_artifacts.push(ArtifactReference::file(
                ArtifactRole::Secondary,
                path,
                &self.app_root,
            )?);
        }
        Ok(self)
    }

    pub fn with_main_remote_artifacts<I, S>(mut self, urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            self.main_remote_artifacts
                .push(ArtifactReference::url(ArtifactRole::Main, url)?);
        }
        Ok(self)
    }

    pub fn with_secondary_remote_artifacts<I, S>(mut self, urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            self.secondary_remote_artifacts
                .push(ArtifactReference::url(ArtifactRole::Secondary, url)?);
        }
        Ok(self)
    }

    pub fn with_snapshots<I, P>(mut self, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.snapshots
                .push(SnapshotReference::file(path, &self.app_root)?);
        }
        Ok(self)
    }

    pub fn with_secret(mut self, secret: SecretDescriptor) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn with_environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let step = self.current_environment().with_entry(key, value);
        self.steps.push(step);
        self
    }

    pub fn with_kafka_connection(self, broker: &BrokerResource) -> Result<Self> {
        self.ensure_kind(broker, TransportKind::Kafka)?;
        self.with_messaging_connection(MessagingConnection::kafka(&broker.name, broker.port))
    }

    pub fn with_amqp_connection(
        self,
        broker: &BrokerResource,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        self.ensure_kind(broker, TransportKind::Amqp)?;
        self.with_messaging_connection(MessagingConnection::amqp(
            &broker.name,
            broker.port,
            username.map(str::to_string),
            password.map(str::to_string),
        ))
    }

    pub fn with_mqtt_connection(
        self,
        broker: &BrokerResource,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        self.ensure_kind(broker, TransportKind::Mqtt)?;
        self.with_messaging_connection(MessagingConnection::mqtt(
            &broker.name,
            broker.port,
            username.map(str::to_string),
            password.map(str::to_string),
        ))
    }

    pub fn with_messaging_connection(mut self, connection: MessagingConnection) -> Result<Self> {
        let composed = compose(&self.current_environment(), &connection)?;
        self.steps.push(composed.environment);
        if let Some(dependency) = composed.startup_dependency {
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        Ok(self)
    }

    pub fn build(self) -> Result<ManagedServiceInstance> {
        if self.name.trim().is_empty() {
            return Err(CoreError::configuration("managed instance name must not be empty"));
        }

        let environment = self
            .steps
            .iter()
            .fold(EnvironmentDescriptor::new(), |acc, step| acc.merge(step));

        debug!(
            instance = %self.name,
            main_artifacts = self.main_artifacts.len(),
            secondary_artifacts = self.secondary_artifacts.len(),
            remote_artifacts = self.main_remote_artifacts.len() + self.secondary_remote_artifacts.len(),
            secrets = self.secrets.len(),
            snapshots = self.snapshots.len(),
            "Managed instance declared"
        );

        Ok(ManagedServiceInstance {
            name: self.name,
            endpoint: self.endpoint,
            main_artifacts: self.main_artifacts,
            secondary_artifacts: self.secondary_artifacts,
            main_remote_artifacts: self.main_remote_artifacts,
            secondary_remote_artifacts: self.secondary_remote_artifacts,
            secrets: self.secrets,
            snapshots: self.snapshots,
            environment,
            dependencies: self.dependencies,
        })
    }

    fn current_environment(&self) -> EnvironmentDescriptor {
        self.steps.last().cloned().unwrap_or_default()
    }

    fn ensure_kind(&self, broker: &BrokerResource, expected: TransportKind) -> Result<()> {
        if broker.kind != expected {
            return Err(CoreError::configuration(format!(
                "broker '{}' is a {} broker, not {}",
                broker.name, broker.kind, expected
            )));
        }
        Ok(())
    }
}

/// Resources present in the composed environment once they are created.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    managed: Vec<Arc<ManagedServiceInstance>>,
    brokers: Vec<BrokerResource>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_managed(&mut self, instance: ManagedServiceInstance) -> Result<Arc<ManagedServiceInstance>> {
        if self.contains(instance.name()) {
            return Err(CoreError::configuration(format!(
                "resource name '{}' is already used",
                instance.name()
            )));
        }
        let instance = Arc::new(instance);
        self.managed.push(instance.clone());
        Ok(instance)
    }

    pub fn add_broker(&mut self, broker: BrokerResource) -> Result<()> {
        if self.contains(&broker.name) {
            return Err(CoreError::configuration(format!(
                "resource name '{}' is already used",
                broker.name
            )));
        }
        self.brokers.push(broker);
        Ok(())
    }

    pub fn managed_instances(&self) -> &[Arc<ManagedServiceInstance>] {
        &self.managed
    }

    pub fn brokers(&self) -> &[BrokerResource] {
        &self.brokers
    }

    pub fn find_managed(&self, name: &str) -> Option<&Arc<ManagedServiceInstance>> {
        self.managed.iter().find(|instance| instance.name() == name)
    }

    pub fn find_broker(&self, name: &str) -> Option<&BrokerResource> {
        self.brokers.iter().find(|broker| broker.name == name)
    }

    /// Every dependency named by a managed instance that is not a known
    /// resource in this topology.
    pub fn unresolved_dependencies(&self) -> Vec<(String, String)> {
        let known: HashSet<&str> = self
            .managed
            .iter()
            .map(|m| m.name())
            .chain(self.brokers.iter().map(|b| b.name.as_str()))
            .collect();

        self.managed
            .iter()
            .flat_map(|instance| {
                instance
                    .dependencies()
                    .iter()
                    .filter(|dep| !known.contains(dep.as_str()))
                    .map(|dep| (instance.name().to_string(), dep.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.find_managed(name).is_some() || self.find_broker(name).is_some()
    }
}
