//! Environment wiring for the messaging transports a managed instance can
//! talk to.
//!
//! Every connection call is composed against the current
//! [`EnvironmentDescriptor`] and yields a new one; nothing is mutated in
//! place, so a rejected connection leaves the previous descriptor intact.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const KAFKA_BOOTSTRAP_SERVER: &str = "KAFKA_BOOTSTRAP_SERVER";
pub const AMQP_SERVER: &str = "AMQP_SERVER";
pub const AMQP_USERNAME: &str = "AMQP_USERNAME";
pub const AMQP_PASSWORD: &str = "AMQP_PASSWORD";
pub const MQTT_SERVER: &str = "MQTT_SERVER";
pub const MQTT_USERNAME: &str = "MQTT_USERNAME";
pub const MQTT_PASSWORD: &str = "MQTT_PASSWORD";
pub const ASYNC_PROTOCOLS: &str = "ASYNC_PROTOCOLS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Kafka,
    Amqp,
    Mqtt,
}

impl TransportKind {
    /// Token appended to `ASYNC_PROTOCOLS`.
    pub fn token(self) -> &'static str {
        match self {
            Self::Kafka => "KAFKA",
            Self::Amqp => "AMQP",
            Self::Mqtt => "MQTT",
        }
    }

    pub fn server_key(self) -> &'static str {
        match self {
            Self::Kafka => KAFKA_BOOTSTRAP_SERVER,
            Self::Amqp => AMQP_SERVER,
            Self::Mqtt => MQTT_SERVER,
        }
    }

    fn credential_keys(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Kafka => None,
            Self::Amqp => Some((AMQP_USERNAME, AMQP_PASSWORD)),
            Self::Mqtt => Some((MQTT_USERNAME, MQTT_PASSWORD)),
        }
    }

    /// Kafka instances are not gated on their broker's health.
    pub fn registers_startup_dependency(self) -> bool {
        !matches!(self, Self::Kafka)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A requested connection from a managed instance to a messaging broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConnection {
    pub kind: TransportKind,
    pub broker_name: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MessagingConnection {
    pub fn kafka(broker_name: impl Into<String>, broker_port: u16) -> Self {
        Self {
            kind: TransportKind::Kafka,
            broker_name: broker_name.into(),
            broker_port,
            username: None,
            password: None,
        }
    }

    pub fn amqp(
        broker_name: impl Into<String>,
        broker_port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            kind: TransportKind::Amqp,
            broker_name: broker_name.into(),
            broker_port,
            username,
            password,
        }
    }

    pub fn mqtt(
        broker_name: impl Into<String>,
        broker_port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            kind: TransportKind::Mqtt,
            broker_name: broker_name.into(),
            broker_port,
            username,
            password,
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.broker_name, self.broker_port)
    }

    fn validate(&self) -> Result<()> {
        if self.broker_name.trim().is_empty() {
            return Err(CoreError::configuration(format!(
                "{} connection requires a broker name",
                self.kind
            )));
        }
        if self.broker_port == 0 {
            return Err(CoreError::configuration(format!(
                "{} connection to '{}' requires a broker port",
                self.kind, self.broker_name
            )));
        }

        match self.kind {
            TransportKind::Kafka => {
                if self.username.is_some() || self.password.is_some() {
                    return Err(CoreError::configuration(
                        "KAFKA connection does not accept credentials",
                    ));
                }
            }
            TransportKind::Amqp => {
                if self.username.is_none() {
                    return Err(CoreError::configuration(
                        "AMQP connection requires a username",
                    ));
                }
                if self.password.is_none() {
                    return Err(CoreError::configuration(
                        "AMQP connection requires a password",
                    ));
                }
            }
            TransportKind::Mqtt => {}
        }

        Ok(())
    }
}

/// Comma separated list of configured transport tokens.
///
/// Accumulation appends `,TOKEN` to whatever was there before, so the raw
/// value starts with a separator. Reads skip empty segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolAccumulator {
    raw: String,
}

impl ProtocolAccumulator {
    pub fn parse(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn append(&self, token: &str) -> Self {
        Self {
            raw: format!("{},{}", self.raw, token),
        }
    }

    /// The accumulated string exactly as appended.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.raw
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    pub fn value(&self) -> String {
        self.tokens().join(",")
    }

    pub fn contains(&self, kind: TransportKind) -> bool {
        self.tokens().contains(&kind.token())
    }

    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

/// Environment entries attached to a managed instance before it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    entries: BTreeMap<String, String>,
    protocols: Option<ProtocolAccumulator>,
}

impl EnvironmentDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `key` set. `ASYNC_PROTOCOLS` is parsed into the
    /// accumulator so later connection calls keep appending to it.
    pub fn with_entry(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        let mut next = self.clone();
        if key == ASYNC_PROTOCOLS {
            next.protocols = Some(ProtocolAccumulator::parse(value));
        } else {
            next.entries.insert(key, value);
        }
        next
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if key == ASYNC_PROTOCOLS {
            return self.protocols.as_ref().map(ProtocolAccumulator::value);
        }
        self.entries.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        if key == ASYNC_PROTOCOLS {
            return self.protocols.is_some();
        }
        self.entries.contains_key(key)
    }

    pub fn protocols(&self) -> Option<&ProtocolAccumulator> {
        self.protocols.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.protocols.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened `(key, value)` pairs, sorted by key.
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let mut vars: BTreeMap<String, String> = self.entries.clone();
        if let Some(protocols) = &self.protocols {
            vars.insert(ASYNC_PROTOCOLS.to_string(), protocols.value());
        }
        vars.into_iter().collect()
    }

    /// Overlays `other` on top of `self`; `other` wins on conflicting keys.
    pub fn merge(&self, other: &EnvironmentDescriptor) -> Self {
        let mut next = self.clone();
        for (key, value) in &other.entries {
            next.entries.insert(key.clone(), value.clone());
        }
        if let Some(protocols) = &other.protocols {
            next.protocols = Some(protocols.clone());
        }
        next
    }
}

/// Result of composing one messaging connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedConnection {
    pub environment: EnvironmentDescriptor,
    /// Broker whose health gates the managed instance's readiness.
    pub startup_dependency: Option<String>,
}

/// Composes `connection` onto `current` and returns the resulting
/// environment. Validation happens before anything is derived, so an
/// invalid connection never yields a partial descriptor.
pub fn compose(
    current: &EnvironmentDescriptor,
    connection: &MessagingConnection,
) -> Result<ComposedConnection> {
    connection.validate()?;

    let kind = connection.kind;
    let mut environment = current.with_entry(kind.server_key(), connection.server_address());

    if let Some((username_key, password_key)) = kind.credential_keys() {
        if let Some(username) = &connection.username {
            environment = environment.with_entry(username_key, username.clone());
        }
        if let Some(password) = &connection.password {
            environment = environment.with_entry(password_key, password.clone());
        }
    }

    let protocols = environment
        .protocols
        .clone()
        .unwrap_or_default()
        .append(kind.token());
    environment.protocols = Some(protocols);

    let startup_dependency = kind
        .registers_startup_dependency()
        .then(|| connection.broker_name.clone());

    tracing::debug!(
        transport = %kind,
        broker = %connection.broker_name,
        port = connection.broker_port,
        "Composed messaging connection"
    );

    Ok(ComposedConnection {
        environment,
        startup_dependency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn protocol_set(env: &EnvironmentDescriptor) -> HashSet<String> {
        env.get(ASYNC_PROTOCOLS)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_kafka_sets_bootstrap_server_and_protocol() {
        let composed = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::kafka("kafka", 9092),
        )
        .unwrap();

        assert_eq!(
            composed.environment.get(KAFKA_BOOTSTRAP_SERVER),
            Some("kafka:9092".to_string())
        );
        assert_eq!(
            composed.environment.get(ASYNC_PROTOCOLS),
            Some("KAFKA".to_string())
        );
        assert!(composed.startup_dependency.is_none());
    }

    #[test]
    fn test_kafka_rejects_credentials() {
        let mut connection = MessagingConnection::kafka("kafka", 9092);
        connection.username = Some("user".to_string());

        let result = compose(&EnvironmentDescriptor::new(), &connection);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_amqp_sets_credentials_and_dependency() {
        let composed = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::amqp(
                "rabbitmq",
                5672,
                Some("guest".to_string()),
                Some("secret".to_string()),
            ),
        )
        .unwrap();

        let env = &composed.environment;
        assert_eq!(env.get(AMQP_SERVER), Some("rabbitmq:5672".to_string()));
        assert_eq!(env.get(AMQP_USERNAME), Some("guest".to_string()));
        assert_eq!(env.get(AMQP_PASSWORD), Some("secret".to_string()));
        assert_eq!(env.get(ASYNC_PROTOCOLS), Some("AMQP".to_string()));
        assert_eq!(composed.startup_dependency, Some("rabbitmq".to_string()));
    }

    #[test]
    fn test_amqp_missing_username_fails_without_mutation() {
        let current = EnvironmentDescriptor::new().with_entry("EXISTING", "1");
        let snapshot = current.clone();

        let result = compose(
            &current,
            &MessagingConnection::amqp("rabbitmq", 5672, None, Some("secret".to_string())),
        );

        assert!(matches!(result, Err(CoreError::Configuration(_))));
        assert_eq!(current, snapshot);
        assert!(!current.contains_key(AMQP_SERVER));
        assert!(!current.contains_key(ASYNC_PROTOCOLS));
    }

    #[test]
    fn test_amqp_missing_password_fails() {
        let result = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::amqp("rabbitmq", 5672, Some("guest".to_string()), None),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_mqtt_credentials_are_independent() {
        let username_only = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::mqtt("mosquitto", 1883, Some("user".to_string()), None),
        )
        .unwrap()
        .environment;
        assert_eq!(username_only.get(MQTT_USERNAME), Some("user".to_string()));
        assert!(!username_only.contains_key(MQTT_PASSWORD));

        let password_only = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::mqtt("mosquitto", 1883, None, Some("pw".to_string())),
        )
        .unwrap()
        .environment;
        assert!(!password_only.contains_key(MQTT_USERNAME));
        assert_eq!(password_only.get(MQTT_PASSWORD), Some("pw".to_string()));

        let anonymous = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::mqtt("mosquitto", 1883, None, None),
        )
        .unwrap();
        assert!(!anonymous.environment.contains_key(MQTT_USERNAME));
        assert!(!anonymous.environment.contains_key(MQTT_PASSWORD));
        assert_eq!(
            anonymous.environment.get(MQTT_SERVER),
            Some("mosquitto:1883".to_string())
        );
        assert_eq!(anonymous.startup_dependency, Some("mosquitto".to_string()));
    }

    #[test]
    fn test_kafka_then_mqtt_accumulates_both_protocols() {
        let first = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::kafka("kafka", 9092),
        )
        .unwrap();
        let second = compose(
            &first.environment,
            &MessagingConnection::mqtt("mosquitto", 1883, None, None),
        )
        .unwrap();

        let protocols = protocol_set(&second.environment);
        assert_eq!(protocols.len(), 2);
        assert!(protocols.contains("KAFKA"));
        assert!(protocols.contains("MQTT"));
        assert_eq!(
            second.environment.get(ASYNC_PROTOCOLS),
            Some("KAFKA,MQTT".to_string())
        );
    }

    #[test]
    fn test_raw_accumulator_keeps_leading_separator() {
        let composed = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::kafka("kafka", 9092),
        )
        .unwrap();
        let protocols = composed.environment.protocols().unwrap();
        assert_eq!(protocols.raw(), ",KAFKA");
        assert_eq!(protocols.value(), "KAFKA");
    }

    #[test]
    fn test_same_transport_twice_is_not_deduplicated() {
        let first = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::kafka("kafka", 9092),
        )
        .unwrap();
        let second =
            compose(&first.environment, &MessagingConnection::kafka("kafka-2", 9093)).unwrap();

        assert_eq!(
            second.environment.get(ASYNC_PROTOCOLS),
            Some("KAFKA,KAFKA".to_string())
        );
        assert_eq!(
            second.environment.get(KAFKA_BOOTSTRAP_SERVER),
            Some("kafka-2:9093".to_string())
        );
    }

    #[test]
    fn test_empty_environment_has_no_protocols() {
        let env = EnvironmentDescriptor::new().with_entry("SERVICES_UPDATE_INTERVAL", "1");
        assert!(!env.contains_key(ASYNC_PROTOCOLS));
        assert!(env
            .to_env_vars()
            .iter()
            .all(|(key, _)| key != ASYNC_PROTOCOLS));
    }

    #[test]
    fn test_explicit_protocol_entry_is_parsed_and_trimmed() {
        let env = EnvironmentDescriptor::new().with_entry(ASYNC_PROTOCOLS, ",,WS");
        let composed = compose(&env, &MessagingConnection::kafka("kafka", 9092)).unwrap();
        assert_eq!(
            composed.environment.get(ASYNC_PROTOCOLS),
            Some("WS,KAFKA".to_string())
        );
    }

    #[test]
    fn test_missing_broker_name_or_port() {
        let no_name = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::kafka(" ", 9092),
        );
        assert!(matches!(no_name, Err(CoreError::Configuration(_))));

        let no_port = compose(
            &EnvironmentDescriptor::new(),
            &MessagingConnection::mqtt("mosquitto", 0, None, None),
        );
        assert!(matches!(no_port, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_merge_overlays_entries() {
        let base = EnvironmentDescriptor::new()
            .with_entry("A", "1")
            .with_entry("B", "2");
        let overlay = EnvironmentDescriptor::new().with_entry("B", "3");
        let merged = base.merge(&overlay);

        assert_eq!(merged.get("A"), Some("1".to_string()));
        assert_eq!(merged.get("B"), Some("3".to_string()));
        assert_eq!(merged.len(), 2);
    }

    mod property_messaging_composition {
        use super::*;
        use proptest::prelude::*;

        fn kind_strategy() -> impl Strategy<Value = TransportKind> {
            prop_oneof![
                Just(TransportKind::Kafka),
                Just(TransportKind::Amqp),
                Just(TransportKind::Mqtt),
            ]
        }

        fn connection_for(kind: TransportKind, idx: usize) -> MessagingConnection {
            let broker = format!("broker-{idx}");
            match kind {
                TransportKind::Kafka => MessagingConnection::kafka(broker, 9092),
                TransportKind::Amqp => MessagingConnection::amqp(
                    broker,
                    5672,
                    Some("u".to_string()),
                    Some("p".to_string()),
                ),
                TransportKind::Mqtt => MessagingConnection::mqtt(broker, 1883, None, None),
            }
        }

        proptest! {
            #[test]
            fn property_accumulator_preserves_call_order(
                kinds in proptest::collection::vec(kind_strategy(), 1..6)
            ) {
                let mut env = EnvironmentDescriptor::new();
                for (idx, kind) in kinds.iter().enumerate() {
                    env = compose(&env, &connection_for(*kind, idx)).unwrap().environment;
                }

                let expected: Vec<&str> = kinds.iter().map(|k| k.token()).collect();
                prop_assert_eq!(env.get(ASYNC_PROTOCOLS), Some(expected.join(",")));
            }

            #[test]
            fn property_mqtt_credential_keys_present_iff_supplied(
                username in proptest::option::of("[a-z]{1,8}"),
                password in proptest::option::of("[a-z]{1,8}"),
            ) {
                let env = compose(
                    &EnvironmentDescriptor::new(),
                    &MessagingConnection::mqtt("mosquitto", 1883, username.clone(), password.clone()),
                )
                .unwrap()
                .environment;

                prop_assert_eq!(env.contains_key(MQTT_USERNAME), username.is_some());
                prop_assert_eq!(env.contains_key(MQTT_PASSWORD), password.is_some());
                prop_assert_eq!(env.get(MQTT_USERNAME), username);
                prop_assert_eq!(env.get(MQTT_PASSWORD), password);
            }

            #[test]
            fn property_amqp_without_full_credentials_never_composes(
                username in proptest::option::of("[a-z]{1,8}"),
                password in proptest::option::of("[a-z]{1,8}"),
            ) {
                prop_assume!(username.is_none() || password.is_none());
                let current = EnvironmentDescriptor::new().with_entry("KEEP", "1");
                let result = compose(
                    &current,
                    &MessagingConnection::amqp("rabbitmq", 5672, username, password),
                );
                prop_assert!(matches!(result, Err(CoreError::Configuration(_))));
                prop_assert_eq!(current.len(), 1);
            }
        }
    }
}
