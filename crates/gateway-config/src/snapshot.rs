//! Immutable configuration snapshot.
//!
//! The snapshot is built once at process start, shared behind an `Arc`, and
//! never mutated. It resolves provider capabilities onto each model and
//! indexes agents by name and alias.

use crate::credentials::load_provider_credentials;
use crate::error::ConfigError;
use crate::expand::expand;
use crate::settings::{
    AgentDefinition, EngineSettings, GatewayConfig, KeyPoolSettings, LoggingSettings,
    PatternTemplate,
};
use gateway_core::{Credential, ModelCapabilities};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use url::Url;
use validator::Validate;

/// Resolved provider definition
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefinition {
    /// Provider id
    pub id: String,
    /// Base endpoint
    pub base_url: Url,
    /// Whether calls need a pooled credential
    pub requires_key: bool,
    /// Provider-wide capabilities
    pub capabilities: ModelCapabilities,
}

/// A concrete model reference: catalog name, provider, upstream id, capabilities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTarget {
    /// Catalog name
    pub name: String,
    /// Provider id
    pub provider: String,
    /// Upstream model id
    pub model_id: String,
    /// Resolved capabilities
    pub capabilities: ModelCapabilities,
}

/// Immutable view of the gateway configuration
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    engine: EngineSettings,
    keys: KeyPoolSettings,
    logging: LoggingSettings,
    providers: BTreeMap<String, ProviderDefinition>,
    models: BTreeMap<String, ModelTarget>,
    tiers: BTreeMap<String, Vec<String>>,
    agents: Vec<AgentDefinition>,
    agent_index: HashMap<String, usize>,
    patterns: BTreeMap<String, PatternTemplate>,
    credentials: BTreeMap<String, Vec<Credential>>,
}

impl ConfigSnapshot {
    /// Load credential files and build the snapshot
    pub async fn load(config: GatewayConfig) -> Result<Self, ConfigError> {
        let mut credentials = BTreeMap::new();
        for (id, provider) in &config.providers {
            credentials.insert(id.clone(), load_provider_credentials(id, provider).await);
        }
        Self::build(config, credentials)
    }

    /// Build a snapshot from configuration and already-loaded credentials
    pub fn build(
        config: GatewayConfig,
        credentials: BTreeMap<String, Vec<Credential>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut providers = BTreeMap::new();
        for (id, provider) in &config.providers {
            let base_url = Url::parse(&provider.base_url).map_err(|e| {
                ConfigError::Validation(format!("provider {id}: invalid base_url: {e}"))
            })?;
            let requires_key = provider
                .requires_key
                .unwrap_or_else(|| !id.starts_with("local"));

            if requires_key && credentials.get(id).map_or(true, Vec::is_empty) {
                warn!(provider = %id, "Provider requires keys but none were loaded");
            }

            providers.insert(
                id.clone(),
                ProviderDefinition {
                    id: id.clone(),
                    base_url,
                    requires_key,
                    capabilities: provider.capabilities,
                },
            );
        }

        let mut models = BTreeMap::new();
        for (name, model) in &config.models {
            let provider = providers.get(&model.provider).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "model {name} references unknown provider {}",
                    model.provider
                ))
            })?;
            models.insert(
                name.clone(),
                ModelTarget {
                    name: name.clone(),
                    provider: model.provider.clone(),
                    model_id: model.model_id.clone(),
                    capabilities: model.capabilities.apply(provider.capabilities),
                },
            );
        }

        for tier in config.tiers.keys() {
            if models.contains_key(tier) {
                warn!(tier = %tier, "Tier name shadows a model of the same name");
            }
        }

        let agents = if config.mutations.enabled {
            let patterns: Vec<String> = config.patterns.keys().cloned().collect();
            expand(&config.agents, &patterns, &config.mutations.exclusions)
        } else {
            config.agents.clone()
        };

        let mut agent_index = HashMap::new();
        for (position, agent) in agents.iter().enumerate() {
            for name in std::iter::once(&agent.name).chain(agent.aliases.iter()) {
                if agent_index.insert(name.clone(), position).is_some() {
                    return Err(ConfigError::Validation(format!(
                        "agent name or alias {name} is defined twice"
                    )));
                }
            }
            if agent.router.main.is_empty() && agent.router.fallbacks.is_empty() {
                warn!(agent = %agent.name, "Agent has an empty router");
            }
        }

        info!(
            providers = providers.len(),
            models = models.len(),
            tiers = config.tiers.len(),
            agents = agents.len(),
            "Configuration snapshot built"
        );

        Ok(Self {
            engine: config.engine,
            keys: config.keys,
            logging: config.logging,
            providers,
            models,
            tiers: config.tiers,
            agents,
            agent_index,
            patterns: config.patterns,
            credentials,
        })
    }

    /// Engine settings
    #[must_use]
    pub fn engine(&self) -> &EngineSettings {
        &self.engine
    }

    /// Key pool settings
    #[must_use]
    pub fn keys(&self) -> &KeyPoolSettings {
        &self.keys
    }

    /// Logging settings
    #[must_use]
    pub fn logging(&self) -> &LoggingSettings {
        &self.logging
    }

    /// Look up an agent by name or alias
    #[must_use]
    pub fn agent(&self, name_or_alias: &str) -> Option<&AgentDefinition> {
        self.agent_index
            .get(name_or_alias)
            .and_then(|&i| self.agents.get(i))
    }

    /// All agents, including generated variants
    #[must_use]
    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    /// Look up a model by catalog name
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelTarget> {
        self.models.get(name)
    }

    /// Look up a tier's members
    #[must_use]
    pub fn tier(&self, name: &str) -> Option<&[String]> {
        self.tiers.get(name).map(Vec::as_slice)
    }

    /// Look up a provider
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderDefinition> {
        self.providers.get(id)
    }

    /// All providers
    pub fn providers(&self) -> impl Iterator<Item = &ProviderDefinition> {
        self.providers.values()
    }

    /// Pattern template by name
    #[must_use]
    pub fn pattern(&self, name: &str) -> Option<&PatternTemplate> {
        self.patterns.get(name)
    }

    /// All pattern templates
    #[must_use]
    pub fn patterns(&self) -> &BTreeMap<String, PatternTemplate> {
        &self.patterns
    }

    /// Loaded credentials per provider
    #[must_use]
    pub fn credentials(&self) -> &BTreeMap<String, Vec<Credential>> {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_yaml;
    use gateway_core::KeyKind;

    const CONFIG: &str = r#"
providers:
  groq:
    base_url: https://api.groq.com/openai/v1
    capabilities:
      parallel_tool_calls: true
      json_mode: true
  local-ollama:
    base_url: http://localhost:11434/v1
models:
  llama:
    provider: groq
    model_id: llama-3.3-70b-versatile
    capabilities:
      json_mode: false
  qwen:
    provider: local-ollama
    model_id: qwen2.5
tiers:
  fast: [llama, qwen]
agents:
  - name: standard
    aliases: [default]
    router:
      main: [fast]
      fallbacks: [qwen]
patterns:
  linear_react:
    static_system: "Think linearly. {tools_list_text}"
mutations:
  enabled: true
"#;

    fn snapshot() -> ConfigSnapshot {
        let config = parse_yaml(CONFIG).expect("valid yaml");
        let mut credentials = BTreeMap::new();
        credentials.insert(
            "groq".to_string(),
            vec![Credential::new("groq", 0, KeyKind::Free, "gsk_aaaaaaaaaaaa")],
        );
        ConfigSnapshot::build(config, credentials).expect("valid snapshot")
    }

    #[test]
    fn test_capabilities_resolved_per_model() {
        let snapshot = snapshot();
        let llama = snapshot.model("llama").expect("llama");
        assert!(llama.capabilities.parallel_tool_calls);
        assert!(!llama.capabilities.json_mode);
    }

    #[test]
    fn test_local_providers_are_keyless() {
        let snapshot = snapshot();
        assert!(snapshot.provider("groq").expect("groq").requires_key);
        assert!(!snapshot.provider("local-ollama").expect("local").requires_key);
    }

    #[test]
    fn test_agent_lookup_by_alias_and_variant() {
        let snapshot = snapshot();
        assert_eq!(snapshot.agent("default").map(|a| a.name.as_str()), Some("standard"));
        let variant = snapshot.agent("standard_linear").expect("variant");
        assert_eq!(variant.settings.reasoning_mode, "linear_react");
        assert!(snapshot.agent("missing").is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = parse_yaml(
            "models:\n  ghost:\n    provider: nowhere\n    model_id: x\n",
        )
        .expect("valid yaml");
        let err = ConfigSnapshot::build(config, BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let config = parse_yaml(
            "agents:\n  - name: a\n    aliases: [x]\n    router: {main: []}\n  - name: b\n    aliases: [x]\n    router: {main: []}\n",
        )
        .expect("valid yaml");
        assert!(ConfigSnapshot::build(config, BTreeMap::new()).is_err());
    }
}
