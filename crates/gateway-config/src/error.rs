//! Configuration errors.

use gateway_core::GatewayError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// YAML parse failure
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse failure
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// File extension not recognized
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Range or cross-reference validation failure
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Environment override could not be parsed
    #[error("Invalid value {value:?} for environment variable {name}")]
    Environment {
        /// Variable name
        name: String,
        /// Raw value
        value: String,
    },
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<ConfigError> for GatewayError {
    fn from(error: ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}
