//! Credential file parsing.
//!
//! A credential file holds one key per line. Blank lines and `#` comments are
//! ignored, and `NAME=value` lines with an upper-case `NAME` contribute their
//! value so that `.env` style files can be used as-is. Every other line is
//! taken whole.

use crate::error::ConfigError;
use crate::settings::ProviderConfig;
use gateway_core::{Credential, KeyKind};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Extract keys from credential file content
#[must_use]
pub fn parse_key_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match assignment_value(line) {
            Some(value) => value.trim().trim_matches('"').trim_matches('\'').to_string(),
            None => line.to_string(),
        })
        .filter(|key| !key.is_empty())
        .collect()
}

/// Value of a `NAME=value` (or `export NAME=value`) line.
///
/// `NAME` must be an upper-case environment identifier. Anything else is a
/// bare key, even when it contains `=` (base64 padding).
fn assignment_value(line: &str) -> Option<&str> {
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (name, value) = line.split_once('=')?;
    (is_env_name(name.trim_end()) && !value.starts_with('=')).then_some(value)
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Read one credential file
pub async fn read_key_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parse_key_lines(&content))
}

/// Load every credential configured for a provider, inline entries first.
///
/// Duplicate secrets are loaded once. A missing credential file is logged and
/// skipped so that one absent pool does not prevent start-up.
pub async fn load_provider_credentials(
    provider: &str,
    config: &ProviderConfig,
) -> Vec<Credential> {
    let mut seen = HashSet::new();
    let mut raw: Vec<(String, KeyKind)> = Vec::new();

    for entry in &config.credentials {
        raw.push((entry.secret.expose_secret().clone(), entry.kind));
    }

    for file in &config.credential_files {
        match read_key_file(&file.path).await {
            Ok(keys) => {
                debug!(
                    provider = %provider,
                    path = %file.path.display(),
                    count = keys.len(),
                    "Loaded credential file"
                );
                raw.extend(keys.into_iter().map(|k| (k, file.kind)));
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "Skipping credential file");
            }
        }
    }

    raw.into_iter()
        .filter(|(secret, _)| seen.insert(secret.clone()))
        .enumerate()
        .map(|(index, (secret, kind))| Credential::new(provider, index, kind, secret))
        .collect()
}
