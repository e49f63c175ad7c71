use crate::value::ValueSource;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Declared secret whose credential fields are resolved only when the secret
/// is created on the managed instance.
#[derive(Debug, Clone)]
pub struct SecretDescriptor {
    name: String,
    description: Option<String>,
    username: Option<Arc<dyn ValueSource>>,
    password: Option<Arc<dyn ValueSource>>,
    token: Option<Arc<dyn ValueSource>>,
    token_header: Option<Arc<dyn ValueSource>>,
    ca_cert_pem: Option<Arc<dyn ValueSource>>,
}

/// Secret as sent to the remote API. Absent fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSecret {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_pem: Option<String>,
}

#[derive(Debug, Default)]
pub struct SecretDescriptorBuilder {
    name: String,
    description: Option<String>,
    username: Option<Arc<dyn ValueSource>>,
    password: Option<Arc<dyn ValueSource>>,
    token: Option<Arc<dyn ValueSource>>,
    token_header: Option<Arc<dyn ValueSource>>,
    ca_cert_pem: Option<Arc<dyn ValueSource>>,
}

impl SecretDescriptorBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn username(mut self, source: impl ValueSource + 'static) -> Self {
        self.username = Some(Arc::new(source));
        self
    }

    pub fn password(mut self, source: impl ValueSource + 'static) -> Self {
        self.password = Some(Arc::new(source));
        self
    }

    pub fn token(mut self, source: impl ValueSource + 'static) -> Self {
        self.token = Some(Arc::new(source));
        self
    }

    pub fn token_header(mut self, source: impl ValueSource + 'static) -> Self {
        self.token_header = Some(Arc::new(source));
        self
    }

    pub fn ca_cert_pem(mut self, source: impl ValueSource + 'static) -> Self {
        self.ca_cert_pem = Some(Arc::new(source));
        self
    }

    pub fn build(self) -> Result<SecretDescriptor> {
        if self.name.trim().is_empty() {
            return Err(CoreError::configuration("secret name must not be empty"));
        }

        Ok(SecretDescriptor {
            name: self.name,
            description: self.description,
            username: self.username,
            password: self.password,
            token: self.token,
            token_header: self.token_header,
            ca_cert_pem: self.ca_cert_pem,
        })
    }
}

impl SecretDescriptor {
    pub fn builder(name: impl Into<String>) -> SecretDescriptorBuilder {
        SecretDescriptorBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Resolves every declared credential field, in field order.
    ///
    /// Fields resolving to an empty string are treated as absent.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<ResolvedSecret> {
        Ok(ResolvedSecret {
            name: self.name.clone(),
            description: self.description.clone().filter(|d| !d.is_empty()),
            username: resolve_field(&self.username, cancel).await?,
            password: resolve_field(&self.password, cancel).await?,
            token: resolve_field(&self.token, cancel).await?,
            token_header: resolve_field(&self.token_header, cancel).await?,
            ca_cert_pem: resolve_field(&self.ca_cert_pem, cancel).await?,
        })
    }
}

async fn resolve_field(
    field: &Option<Arc<dyn ValueSource>>,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    match field {
        Some(source) => {
            let value = source.resolve(cancel).await?;
            Ok(Some(value).filter(|v| !v.is_empty()))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{LiteralSource, ParameterSource};

    #[test]
    fn test_empty_name_rejected_at_build_time() {
        let result = SecretDescriptor::builder("  ").build();
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_absent_fields_are_omitted() {
        let secret = SecretDescriptor::builder("github")
            .token(LiteralSource::new("ghp_123"))
            .build()
            .unwrap();

        let resolved = secret.resolve(&CancellationToken::new()).await.unwrap();
        let json = serde_json::to_value(&resolved).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "name": "github", "token": "ghp_123" })
        );
    }

    #[tokio::test]
    async fn test_all_fields_serialize_camel_case() {
        let secret = SecretDescriptor::builder("corp")
            .description("Corporate repository")
            .username(LiteralSource::new("alice"))
            .password(LiteralSource::new("pw"))
            .token(LiteralSource::new("t"))
            .token_header(LiteralSource::new("X-Token"))
            .ca_cert_pem(LiteralSource::new("-----BEGIN CERTIFICATE-----"))
            .build()
            .unwrap();

        let resolved = secret.resolve(&CancellationToken::new()).await.unwrap();
        let json = serde_json::to_value(&resolved).unwrap();

        assert_eq!(json["tokenHeader"], "X-Token");
        assert_eq!(json["caCertPem"], "-----BEGIN CERTIFICATE-----");
        assert_eq!(json["description"], "Corporate repository");
        assert_eq!(json["username"], "alice");
    }

    #[tokio::test]
    async fn test_empty_resolved_value_is_omitted() {
        let secret = SecretDescriptor::builder("blank")
            .username(LiteralSource::new(""))
            .build()
            .unwrap();

        let resolved = secret.resolve(&CancellationToken::new()).await.unwrap();
        assert!(resolved.username.is_none());
        let json = serde_json::to_string(&resolved).unwrap();
        assert!(!json.contains("username"));
    }

    #[tokio::test]
    async fn test_resolution_is_deferred_until_resolve() {
        let (handle, source) = ParameterSource::channel("password");
        let secret = SecretDescriptor::builder("late")
            .password(source)
            .build()
            .unwrap();

        handle.set("set-after-declaration");
        let resolved = secret.resolve(&CancellationToken::new()).await.unwrap();
        assert_eq!(resolved.password.as_deref(), Some("set-after-declaration"));
    }

    #[tokio::test]
    async fn test_resolution_propagates_cancellation() {
        let (_handle, source) = ParameterSource::channel("token");
        let secret = SecretDescriptor::builder("pending")
            .token(source)
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = secret.resolve(&cancel).await;
        assert!(matches!(result, Err(CoreError::Cancelled(_))));
    }
}
