//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// A field is present but unusable.
    #[error("invalid value for '{field}' in {context}: {reason}")]
    InvalidValue {
        field: String,
        context: String,
        reason: String,
    },

    /// Client secret not found through any resolution method.
    #[error(
        "client secret not found. Set the {env_var} environment variable or api.client_secret in the config file"
    )]
    ClientSecretNotFound { env_var: String },
}

impl ConfigError {
    pub(crate) fn missing(field: &str, context: &str) -> Self {
        ConfigError::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, context: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            context: context.to_string(),
            reason: reason.into(),
        }
    }
}
