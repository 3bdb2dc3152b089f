//! Provider registry: provider id → upstream model client.

use crate::openai_compat::{OpenAiCompatibleClient, OpenAiCompatibleConfig};
use gateway_config::ConfigSnapshot;
use gateway_core::{GatewayResult, UpstreamModel};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Registered upstream clients keyed by provider id
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn UpstreamModel>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one OpenAI-compatible client per configured provider
    pub fn from_snapshot(snapshot: &ConfigSnapshot, timeout: Duration) -> GatewayResult<Self> {
        let mut registry = Self::new();
        for provider in snapshot.providers() {
            let config = OpenAiCompatibleConfig::new(provider.id.clone(), provider.base_url.clone())
                .with_timeout(timeout);
            registry.register(Arc::new(OpenAiCompatibleClient::new(config)?));
        }
        info!(providers = registry.len(), "Provider registry built");
        Ok(registry)
    }

    /// Register a client under its provider id, replacing any previous one
    pub fn register(&mut self, model: Arc<dyn UpstreamModel>) {
        self.providers.insert(model.provider_id().to_string(), model);
    }

    /// Client for a provider
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<dyn UpstreamModel>> {
        self.providers.get(provider).cloned()
    }

    /// Registered provider ids
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
