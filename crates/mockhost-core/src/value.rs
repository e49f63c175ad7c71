//! Deferred values for secret credentials.
//!
//! A value source is declared up front but only resolved when the secret is
//! created on a running instance.

use crate::{CoreError, Result};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ValueSource: Send + Sync + fmt::Debug {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<String>;
}

#[async_trait]
impl<T: ValueSource + ?Sized> ValueSource for std::sync::Arc<T> {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<String> {
        (**self).resolve(cancel).await
    }
}

/// A value known at declaration time.
#[derive(Clone, PartialEq, Eq)]
pub struct LiteralSource(String);

impl LiteralSource {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Debug for LiteralSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LiteralSource(***)")
    }
}

#[async_trait]
impl ValueSource for LiteralSource {
    async fn resolve(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads an environment variable when resolved, not when declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarSource {
    variable: String,
}

impl EnvVarSource {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl ValueSource for EnvVarSource {
    async fn resolve(&self, _cancel: &CancellationToken) -> Result<String> {
        std::env::var(&self.variable).map_err(|e| {
            CoreError::ValueResolution(format!(
                "environment variable '{}' is not available: {e}",
                self.variable
            ))
        })
    }
}

/// A parameter whose value is supplied later by the hosting layer.
#[derive(Debug, Clone)]
pub struct ParameterSource {
    name: String,
    receiver: watch::Receiver<Option<String>>,
}

/// Write side of a [`ParameterSource`].
#[derive(Debug)]
pub struct ParameterHandle {
    name: String,
    sender: watch::Sender<Option<String>>,
}

impl ParameterSource {
    pub fn channel(name: impl Into<String>) -> (ParameterHandle, ParameterSource) {
        let name = name.into();
        let (sender, receiver) = watch::channel(None);
        (
            ParameterHandle {
                name: name.clone(),
                sender,
            },
            ParameterSource { name, receiver },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ParameterHandle {
    pub fn set(&self, value: impl Into<String>) {
        self.sender.send_replace(Some(value.into()));
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ValueSource for ParameterSource {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<String> {
        let mut receiver = self.receiver.clone();
        let resolved = async {
            receiver
                .wait_for(Option::is_some)
                .await
                .map(|value| value.clone())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled(format!(
                "resolution of parameter '{}' was cancelled",
                self.name
            ))),
            result = resolved => match result {
                Ok(Some(value)) => Ok(value),
                Ok(None) | Err(_) => Err(CoreError::ValueResolution(format!(
                    "parameter '{}' was dropped before a value was supplied",
                    self.name
                ))),
            },
        }
    }
}
