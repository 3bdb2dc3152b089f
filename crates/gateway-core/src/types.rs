//! Identifier and credential types.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier of a reasoning session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Billing class of a credential
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Free-tier key
    #[default]
    Free,
    /// Paid key
    Paid,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.write_str("free"),
            Self::Paid => f.write_str("paid"),
        }
    }
}

/// An upstream API credential.
///
/// The secret is never mutated and never printed: `Display` renders the masked
/// identifier (`key_abcd...wxyz`). Identity is the `(provider, index)` pair
/// assigned when the pool is loaded.
#[derive(Clone)]
pub struct Credential {
    provider: String,
    index: usize,
    kind: KeyKind,
    secret: Arc<SecretString>,
}

impl Credential {
    /// Create a credential for a provider
    pub fn new(
        provider: impl Into<String>,
        index: usize,
        kind: KeyKind,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            index,
            kind,
            secret: Arc::new(SecretString::new(secret.into())),
        }
    }

    /// Provider this credential belongs to
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Position of this credential in its provider pool
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Billing class
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Expose the secret for an outgoing request
    #[must_use]
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Masked identifier safe for logs
    #[must_use]
    pub fn masked(&self) -> String {
        mask_secret(self.secret.expose_secret())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider && self.index == other.index
    }
}

impl Eq for Credential {}

impl std::hash::Hash for Credential {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("key", &self.masked())
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Mask a secret as `key_{first4}...{last4}`
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "key_****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("key_{head}...{tail}")
}
