//! Configuration fixtures for integration tests

use std::fmt::Write as _;

/// One provider entry of a generated configuration
#[derive(Debug, Clone)]
pub struct ProviderFixture {
    pub id: String,
    pub base_url: String,
    pub keys: Vec<String>,
}

impl ProviderFixture {
    /// Provider with `keys` inline credentials
    pub fn new(id: &str, base_url: &str, keys: usize) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.to_string(),
            keys: (0..keys).map(|i| format!("sk-{id}-{i:04}-abcdefghijkl")).collect(),
        }
    }
}

/// Builds YAML gateway configurations
#[derive(Debug, Clone)]
pub struct ConfigFixture {
    providers: Vec<ProviderFixture>,
    main: Vec<String>,
    fallbacks: Vec<String>,
    engine: Vec<String>,
}

impl ConfigFixture {
    /// One model per provider, named after the provider in upper case
    pub fn new(providers: Vec<ProviderFixture>) -> Self {
        Self {
            providers,
            main: Vec::new(),
            fallbacks: Vec::new(),
            engine: vec![
                "upstream_timeout: 5s".to_string(),
                "tool_timeout: 2s".to_string(),
                "progress: []".to_string(),
                "backoff: {initial_delay: 0s, max_delay: 0s, jitter: false}".to_string(),
            ],
        }
    }

    /// Main router entries
    pub fn main(mut self, entries: &[&str]) -> Self {
        self.main = entries.iter().map(ToString::to_string).collect();
        self
    }

    /// Fallback router entries
    pub fn fallbacks(mut self, entries: &[&str]) -> Self {
        self.fallbacks = entries.iter().map(ToString::to_string).collect();
        self
    }

    /// Set an `engine:` line, e.g. `max_steps: 2`, replacing the same key
    pub fn engine(mut self, line: &str) -> Self {
        let key = line.split(':').next().unwrap_or(line);
        self.engine
            .retain(|existing| existing.split(':').next() != Some(key));
        self.engine.push(line.to_string());
        self
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> String {
        let mut yaml = String::from("engine:\n");
        for line in &self.engine {
            let _ = writeln!(yaml, "  {line}");
        }

        yaml.push_str("providers:\n");
        for provider in &self.providers {
            let _ = writeln!(yaml, "  {}:", provider.id);
            let _ = writeln!(yaml, "    base_url: '{}'", provider.base_url);
            if !provider.keys.is_empty() {
                yaml.push_str("    credentials:\n");
                for key in &provider.keys {
                    let _ = writeln!(yaml, "      - {{secret: '{key}'}}");
                }
            }
        }

        yaml.push_str("models:\n");
        for provider in &self.providers {
            let _ = writeln!(
                yaml,
                "  {}: {{provider: {}, model_id: {}-model}}",
                provider.id.to_uppercase(),
                provider.id,
                provider.id
            );
        }

        yaml.push_str("agents:\n");
        yaml.push_str("  - name: standard\n");
        let _ = writeln!(
            yaml,
            "    router: {{main: [{}], fallbacks: [{}]}}",
            self.main.join(", "),
            self.fallbacks.join(", ")
        );
        yaml
    }
}
