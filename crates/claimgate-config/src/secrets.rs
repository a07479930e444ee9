//! Client secret resolution.
//!
//! Resolution order:
//! 1. Environment variable (`CLAIMGATE_CLIENT_SECRET`)
//! 2. Config file (with warning at load time)

use crate::{ConfigError, Result};

/// Environment variable holding the API client secret.
pub const CLIENT_SECRET_ENV: &str = "CLAIMGATE_CLIENT_SECRET";

/// Result of secret resolution with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the API client secret, env var first.
pub fn resolve_client_secret(config_value: Option<&str>) -> Result<ResolvedSecret> {
    resolve_from(std::env::var(CLIENT_SECRET_ENV).ok(), config_value)
}

fn resolve_from(env_value: Option<String>, config_value: Option<&str>) -> Result<ResolvedSecret> {
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Ok(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(CLIENT_SECRET_ENV.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
        .ok_or_else(|| ConfigError::ClientSecretNotFound {
            env_var: CLIENT_SECRET_ENV.to_string(),
        })
}
