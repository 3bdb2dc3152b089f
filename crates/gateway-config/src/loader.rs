//! Configuration loading from an explicit file path plus environment overrides.

use crate::error::ConfigError;
use crate::settings::{GatewayConfig, LogFormat};
use std::path::Path;
use tracing::debug;

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Parse a YAML document
pub fn parse_yaml(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
}

/// Parse a TOML document
pub fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration from a file, choosing the parser by extension,
/// then apply `GATEWAY_*` environment overrides.
pub async fn load_config(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mut config = match extension.as_str() {
        "yaml" | "yml" => parse_yaml(&content)?,
        "toml" => parse_toml(&content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    debug!(path = %path.display(), "Configuration loaded");

    Ok(config)
}

/// Apply environment overrides using the given variable lookup
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::Environment {
                    name: "GATEWAY_LOG_FORMAT".into(),
                    value: format,
                })
            }
        };
    }

    if let Some(value) = lookup("GATEWAY_MAX_STEPS") {
        config.engine.max_steps = parse_env("GATEWAY_MAX_STEPS", &value)?;
    }

    if let Some(value) = lookup("GATEWAY_MAX_CHAIN_ATTEMPTS") {
        config.engine.max_chain_attempts = parse_env("GATEWAY_MAX_CHAIN_ATTEMPTS", &value)?;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Environment {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_yaml_durations() {
        let config = parse_yaml(
            "engine:\n  upstream_timeout: 30s\n  session_timeout: 5m\nkeys:\n  quarantine_duration: 1m\n",
        )
        .expect("valid yaml");
        assert_eq!(config.engine.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.engine.session_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.keys.quarantine_duration, Duration::from_secs(60));
        assert_eq!(config.engine.max_chain_attempts, 3);
    }

    #[test]
    fn test_parse_toml() {
        let config = parse_toml(
            r#"
[engine]
max_steps = 4

[tiers]
fast = ["a", "b"]

[[agents]]
name = "standard"
[agents.router]
main = ["fast"]
"#,
        )
        .expect("valid toml");
        assert_eq!(config.engine.max_steps, 4);
        assert_eq!(config.tiers["fast"], vec!["a", "b"]);
        assert_eq!(config.agents[0].router.main, vec!["fast"]);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GATEWAY_LOG_LEVEL", "debug"),
            ("GATEWAY_LOG_FORMAT", "json"),
            ("GATEWAY_MAX_CHAIN_ATTEMPTS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(ToString::to_string))
            .expect("valid overrides");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.engine.max_chain_attempts, 5);
    }

    #[test]
    fn test_env_override_invalid_number() {
        let mut config = GatewayConfig::default();
        let result = apply_env_overrides(&mut config, |name| {
            (name == "GATEWAY_MAX_STEPS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Environment { .. })));
    }

    #[tokio::test]
    async fn test_load_config_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        writeln!(file, "engine:\n  max_steps: 7").expect("write");

        let config = load_config(file.path()).await.expect("loads");
        assert_eq!(config.engine.max_steps, 7);
    }

    #[tokio::test]
    async fn test_load_config_rejects_unknown_extension() {
        let file = tempfile::Builder::new()
            .suffix(".ini")
            .tempfile()
            .expect("temp file");
        let result = load_config(file.path()).await;
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
