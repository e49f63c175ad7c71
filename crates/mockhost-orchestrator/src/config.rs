//! Runtime configuration of the `mockhost-provision` binary and the JSON
//! topology file it loads.

use crate::shared::error::{OrchestratorError, OrchestratorResult};
use mockhost_core::{
    AllocatedEndpoint, BrokerResource, EndpointSlot, EnvVarSource, ExecutionMode, LiteralSource,
    ManagedServiceInstance, MessagingConnection, SecretDescriptor, SecretDescriptorBuilder,
    Topology, TransportKind, ValueSource,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const TOPOLOGY_VAR: &str = "MOCKHOST_TOPOLOGY";
pub const EXECUTION_MODE_VAR: &str = "MOCKHOST_EXECUTION_MODE";
pub const APP_ROOT_VAR: &str = "MOCKHOST_APP_ROOT";
pub const HEALTH_PATH_VAR: &str = "MOCKHOST_HEALTH_PATH";
pub const HEALTH_POLL_INTERVAL_VAR: &str = "MOCKHOST_HEALTH_POLL_INTERVAL_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "MOCKHOST_REQUEST_TIMEOUT_SECS";

const DEFAULT_HEALTH_PATH: &str = "/api/health";
const DEFAULT_HEALTH_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub topology_path: PathBuf,
    pub mode: ExecutionMode,
    pub app_root: PathBuf,
    pub health_path: String,
    pub health_poll_interval: Duration,
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn from_env() -> OrchestratorResult<Self> {
        let app_root = match std::env::var(APP_ROOT_VAR) {
            Ok(root) => PathBuf::from(root),
            Err(_) => std::env::current_dir()?,
        };
        Self::from_lookup(|key| std::env::var(key).ok(), app_root)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    /// `default_app_root` is used when `MOCKHOST_APP_ROOT` is not set.
    pub fn from_lookup<F>(lookup: F, default_app_root: PathBuf) -> OrchestratorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let topology_path = lookup(TOPOLOGY_VAR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                OrchestratorError::Configuration(format!("{TOPOLOGY_VAR} is not set"))
            })?;

        let mode = match lookup(EXECUTION_MODE_VAR) {
            Some(value) => value.parse::<ExecutionMode>()?,
            None => ExecutionMode::Run,
        };

        let app_root = lookup(APP_ROOT_VAR)
            .map(PathBuf::from)
            .unwrap_or(default_app_root);

        let health_path =
            lookup(HEALTH_PATH_VAR).unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());

        let health_poll_interval = Duration::from_millis(parse_number(
            &lookup,
            HEALTH_POLL_INTERVAL_VAR,
            DEFAULT_HEALTH_POLL_INTERVAL_MS,
        )?);
        let request_timeout = Duration::from_secs(parse_number(
            &lookup,
            REQUEST_TIMEOUT_VAR,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        Ok(Self {
            topology_path,
            mode,
            app_root,
            health_path,
            health_poll_interval,
            request_timeout,
        })
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> OrchestratorResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(OrchestratorError::Configuration(format!(
                "{key} must be greater than zero"
            ))),
            Ok(value) => Ok(value),
            Err(e) => Err(OrchestratorError::Configuration(format!(
                "{key} must be a positive integer, got '{raw}': {e}"
            ))),
        },
    }
}

/// Declaration of a whole topology, mirroring the builder calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TopologyFile {
    #[serde(default)]
    pub brokers: Vec<BrokerSpec>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BrokerSpec {
    pub name: String,
    pub kind: TransportKind,
    pub port: u16,
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointSpec {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default)]
    pub endpoint: Option<EndpointSpec>,
    #[serde(default)]
    pub main_artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub secondary_artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub main_remote_artifacts: Vec<String>,
    #[serde(default)]
    pub secondary_remote_artifacts: Vec<String>,
    #[serde(default)]
    pub snapshots: Vec<PathBuf>,
    #[serde(default)]
    pub secrets: Vec<SecretSpec>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub username: Option<ValueSpec>,
    #[serde(default)]
    pub password: Option<ValueSpec>,
    #[serde(default)]
    pub token: Option<ValueSpec>,
    #[serde(default)]
    pub token_header: Option<ValueSpec>,
    #[serde(default)]
    pub ca_cert_pem: Option<ValueSpec>,
}

/// `{"literal": "..."}` or `{"env": "VARIABLE"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueSpec {
    Literal(String),
    Env(String),
}

impl ValueSpec {
    pub fn into_source(self) -> Arc<dyn ValueSource> {
        match self {
            Self::Literal(value) => Arc::new(LiteralSource::new(value)),
            Self::Env(variable) => Arc::new(EnvVarSource::new(variable)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectionSpec {
    pub broker: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl TopologyFile {
    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "failed to read topology file '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> OrchestratorResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            OrchestratorError::Configuration(format!("invalid topology file: {e}"))
        })
    }

    /// Declares every broker and instance. Artifact paths are checked here,
    /// relative to `app_root`.
    pub fn into_topology(self, app_root: &Path) -> OrchestratorResult<Topology> {
        let mut topology = Topology::new();
        for broker in self.brokers {
            let mut resource = BrokerResource::new(broker.name, broker.kind, broker.port);
            if let Some(host) = broker.host {
                resource = resource.with_host(host);
            }
            topology.add_broker(resource)?;
        }

        for spec in self.instances {
            let instance = spec.into_instance(&topology, app_root)?;
            topology.add_managed(instance)?;
        }
        Ok(topology)
    }
}

impl InstanceSpec {
    fn into_instance(
        self,
        topology: &Topology,
        app_root: &Path,
    ) -> OrchestratorResult<ManagedServiceInstance> {
        let endpoint = EndpointSlot::new();
        if let Some(spec) = self.endpoint {
            endpoint.allocate(AllocatedEndpoint::new(spec.host, spec.port))?;
        }

        let mut builder = ManagedServiceInstance::builder(self.name, app_root)
            .with_endpoint(endpoint)
            .with_main_artifacts(self.main_artifacts)?
            .with_secondary_artifacts(self.secondary_artifacts)?
            .with_main_remote_artifacts(self.main_remote_artifacts)?
            .with_secondary_remote_artifacts(self.secondary_remote_artifacts)?
            .with_snapshots(self.snapshots)?;

        for (key, value) in self.environment {
            builder = builder.with_environment(key, value);
        }
        for secret in self.secrets {
            builder = builder.with_secret(secret.into_descriptor()?);
        }
        for connection in self.connections {
            let broker = topology.find_broker(&connection.broker).ok_or_else(|| {
                OrchestratorError::Configuration(format!(
                    "connection references unknown broker '{}'",
                    connection.broker
                ))
            })?;
            builder = builder.with_messaging_connection(MessagingConnection {
                kind: broker.kind,
                broker_name: broker.name.clone(),
                broker_port: broker.port,
                username: connection.username,
                password: connection.password,
            })?;
        }

        Ok(builder.build()?)
    }
}

impl SecretSpec {
    fn into_descriptor(self) -> OrchestratorResult<SecretDescriptor> {
        let mut builder = SecretDescriptor::builder(self.name);
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        builder = apply(builder, self.username, |b, v| b.username(v));
        builder = apply(builder, self.password, |b, v| b.password(v));
        builder = apply(builder, self.token, |b, v| b.token(v));
        builder = apply(builder, self.token_header, |b, v| b.token_header(v));
        builder = apply(builder, self.ca_cert_pem, |b, v| b.ca_cert_pem(v));
        Ok(builder.build()?)
    }
}

fn apply(
    builder: SecretDescriptorBuilder,
    value: Option<ValueSpec>,
    set: fn(SecretDescriptorBuilder, Arc<dyn ValueSource>) -> SecretDescriptorBuilder,
) -> SecretDescriptorBuilder {
    match value {
        Some(spec) => set(builder, spec.into_source()),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockhost_core::connection::{AMQP_USERNAME, ASYNC_PROTOCOLS, KAFKA_BOOTSTRAP_SERVER};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::from_lookup(
            lookup(&[(TOPOLOGY_VAR, "topology.json")]),
            PathBuf::from("/srv/app"),
        )
        .unwrap();

        assert_eq!(config.topology_path, PathBuf::from("topology.json"));
        assert_eq!(config.mode, ExecutionMode::Run);
        assert_eq!(config.app_root, PathBuf::from("/srv/app"));
        assert_eq!(config.health_path, "/api/health");
        assert_eq!(config.health_poll_interval, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_overrides() {
        let config = OrchestratorConfig::from_lookup(
            lookup(&[
                (TOPOLOGY_VAR, "t.json"),
                (EXECUTION_MODE_VAR, "publish"),
                (APP_ROOT_VAR, "/other"),
                (HEALTH_PATH_VAR, "/q/health"),
                (HEALTH_POLL_INTERVAL_VAR, "50"),
                (REQUEST_TIMEOUT_VAR, "5"),
            ]),
            PathBuf::from("/srv/app"),
        )
        .unwrap();

        assert_eq!(config.mode, ExecutionMode::Publish);
        assert_eq!(config.app_root, PathBuf::from("/other"));
        assert_eq!(config.health_path, "/q/health");
        assert_eq!(config.health_poll_interval, Duration::from_millis(50));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_requires_topology() {
        let result = OrchestratorConfig::from_lookup(lookup(&[]), PathBuf::from("/"));
        assert!(matches!(result, Err(OrchestratorError::Configuration(_))));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        for (key, value) in [
            (EXECUTION_MODE_VAR, "deploy"),
            (HEALTH_POLL_INTERVAL_VAR, "soon"),
            (REQUEST_TIMEOUT_VAR, "0"),
        ] {
            let result = OrchestratorConfig::from_lookup(
                lookup(&[(TOPOLOGY_VAR, "t.json"), (key, value)]),
                PathBuf::from("/"),
            );
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
    }

    #[test]
    fn test_topology_file_builds_instances_and_brokers() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("pastries.yaml"), "openapi: 3.0.0").unwrap();

        let file = TopologyFile::parse(
            r#"{
                "brokers": [
                    {"name": "kafka", "kind": "kafka", "port": 9092},
                    {"name": "rabbitmq", "kind": "amqp", "port": 5672, "host": "localhost"}
                ],
                "instances": [{
                    "name": "microcks",
                    "endpoint": {"host": "localhost", "port": 8585},
                    "mainArtifacts": ["pastries.yaml"],
                    "mainRemoteArtifacts": ["https://x/api.yaml"],
                    "secrets": [{
                        "name": "git",
                        "username": {"literal": "user"},
                        "tokenHeader": {"env": "GIT_TOKEN_HEADER"}
                    }],
                    "environment": {"SERVICES_UPDATE_INTERVAL": "1"},
                    "connections": [
                        {"broker": "kafka"},
                        {"broker": "rabbitmq", "username": "guest", "password": "guest"}
                    ]
                }]
            }"#,
        )
        .unwrap();

        let topology = file.into_topology(root.path()).unwrap();
        let instance = topology.find_managed("microcks").unwrap();

        assert_eq!(
            instance.endpoint().allocated().unwrap().base_url(),
            "http://localhost:8585"
        );
        assert_eq!(instance.main_artifacts().len(), 1);
        assert_eq!(instance.secrets()[0].name(), "git");
        assert_eq!(
            instance.environment().get(KAFKA_BOOTSTRAP_SERVER),
            Some("kafka:9092".to_string())
        );
        assert_eq!(
            instance.environment().get(AMQP_USERNAME),
            Some("guest".to_string())
        );
        assert_eq!(
            instance.environment().get(ASYNC_PROTOCOLS),
            Some("KAFKA,AMQP".to_string())
        );
        assert_eq!(instance.dependencies(), &["rabbitmq".to_string()]);
        assert_eq!(topology.find_broker("rabbitmq").unwrap().host, "localhost");
    }

    #[test]
    fn test_topology_file_rejects_unknown_broker() {
        let root = tempfile::tempdir().unwrap();
        let file = TopologyFile::parse(
            r#"{"instances": [{"name": "microcks", "connections": [{"broker": "nope"}]}]}"#,
        )
        .unwrap();
        assert!(file.into_topology(root.path()).is_err());
    }

    #[test]
    fn test_topology_file_rejects_kafka_credentials() {
        let root = tempfile::tempdir().unwrap();
        let file = TopologyFile::parse(
            r#"{
                "brokers": [{"name": "kafka", "kind": "kafka", "port": 9092}],
                "instances": [{"name": "m", "connections": [{"broker": "kafka", "username": "u"}]}]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            file.into_topology(root.path()),
            Err(OrchestratorError::Configuration(_))
        ));
    }

    #[test]
    fn test_topology_file_rejects_missing_artifact() {
        let root = tempfile::tempdir().unwrap();
        let file = TopologyFile::parse(
            r#"{"instances": [{"name": "m", "mainArtifacts": ["missing.yaml"]}]}"#,
        )
        .unwrap();
        assert!(file.into_topology(root.path()).is_err());
    }

    #[test]
    fn test_malformed_topology_file() {
        assert!(TopologyFile::parse("{\"instances\": 3}").is_err());
        assert!(TopologyFile::parse("{\"unknown\": []}").is_err());
    }
}
