//! Upstream model abstraction.

use crate::error::GatewayResult;
use crate::request::{ModelRequest, ToolCall};
use crate::types::Credential;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capability flags of a provider or model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Model accepts `parallel_tool_calls`
    #[serde(default)]
    pub parallel_tool_calls: bool,
    /// Model accepts JSON-mode response formats
    #[serde(default)]
    pub json_mode: bool,
    /// Default sampling temperature for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            parallel_tool_calls: false,
            json_mode: true,
            temperature: None,
        }
    }
}

/// Reply of an upstream model call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReply {
    /// Text content, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Native tool calls, if the provider returned any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Separate reasoning channel some providers expose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ModelReply {
    /// Reply carrying only text
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Text content or empty string
    #[must_use]
    pub fn text_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// A chat-completion capable upstream.
///
/// Implementations map transport and HTTP failures onto the gateway error
/// taxonomy: 429 → `RateLimited`, 400/422 → `MalformedUpstreamResponse` (with
/// the raw body), 401/403 → `Authentication`, elapsed wait → `Timeout`,
/// anything else → `Provider`.
#[async_trait]
pub trait UpstreamModel: Send + Sync + std::fmt::Debug {
    /// Provider identifier
    fn provider_id(&self) -> &str;

    /// Perform one chat completion. `credential` is `None` for keyless providers.
    async fn complete(
        &self,
        credential: Option<&Credential>,
        request: &ModelRequest,
    ) -> GatewayResult<ModelReply>;
}
