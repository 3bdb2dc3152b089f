//! # Gateway Config
//!
//! Configuration management for the agent gateway engine.
//!
//! - Serde configuration model with humantime durations
//! - YAML/TOML loading from an explicit path with `GATEWAY_*` overrides
//! - Credential file parsing
//! - Immutable [`ConfigSnapshot`] shared by the engine
//! - Config-time agent mutation ([`expand`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod error;
pub mod expand;
pub mod loader;
pub mod settings;
pub mod snapshot;

pub use error::ConfigError;
pub use expand::{expand, mutation_suffix};
pub use loader::{apply_env_overrides, load_config, parse_toml, parse_yaml, CONFIG_PATH_ENV};
pub use settings::{
    AgentDefinition, AgentSettings, BackoffSettings, CapabilityOverrides, EngineSettings,
    GatewayConfig, KeyPoolSettings, LogFormat, LoggingSettings, ModelConfig, MutationSettings,
    PatternTemplate, ProgressStep, ProviderConfig, RouterSettings, ToolPolicy,
};
pub use snapshot::{ConfigSnapshot, ModelTarget, ProviderDefinition};
