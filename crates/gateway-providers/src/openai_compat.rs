//! OpenAI-compatible chat-completions upstream.
//!
//! Every configured provider (hosted or local) speaks the
//! `POST {base_url}/chat/completions` dialect. Provider-specific payloads are
//! not translated; the client only classifies failures:
//! - 429 → rate limited (with `Retry-After` when present)
//! - 400/422 → malformed upstream response, body kept for recovery
//! - 401/403 → authentication
//! - 5xx → retryable provider error
//! - transport timeout → timeout

use crate::history::normalize_history;
use async_trait::async_trait;
use gateway_core::{
    Credential, FunctionCall, GatewayError, GatewayResult, ModelReply, ModelRequest, ToolCall,
    ToolChoice, ToolDefinition, UpstreamModel,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client configuration
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Provider id
    pub id: String,
    /// Base endpoint, e.g. `https://api.groq.com/openai/v1`
    pub base_url: Url,
    /// Request timeout
    pub timeout: Duration,
}

impl OpenAiCompatibleConfig {
    /// Create a configuration with the default timeout
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: Url) -> Self {
        Self {
            id: id.into(),
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

/// HTTP client for one OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    config: OpenAiCompatibleConfig,
    client: Client,
    completions_url: String,
}

impl OpenAiCompatibleClient {
    /// Create a new client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: OpenAiCompatibleConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            completions_url: config.completions_url(),
            config,
            client,
        })
    }

    /// Chat-completions endpoint
    #[must_use]
    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    fn transform_request<'a>(&self, request: &'a ModelRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &request.model,
            messages: normalize_history(&request.messages)
                .into_iter()
                .map(WireMessage::from)
                .collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
            tool_choice: if request.tools.is_empty() {
                None
            } else {
                request.tool_choice
            },
            parallel_tool_calls: if request.tools.is_empty() {
                None
            } else {
                request.parallel_tool_calls
            },
            response_format: request
                .json_mode
                .then(|| serde_json::json!({"type": "json_object"})),
        }
    }

    fn transform_response(&self, response: CompletionResponse) -> GatewayResult<ModelReply> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            GatewayError::provider(&self.config.id, "Response contained no choices", None, false)
        })?;

        let message = choice.message;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{i}")),
                tool_type: call.tool_type.unwrap_or_else(|| "function".to_string()),
                function: FunctionCall {
                    name: call.function.name,
                    arguments: call.function.arguments.unwrap_or_default(),
                },
            })
            .collect();

        Ok(ModelReply {
            content: message.content,
            tool_calls,
            reasoning: message.reasoning.or(message.reasoning_content),
        })
    }
}

/// Map a non-success status to the gateway error taxonomy
#[must_use]
pub fn classify_status(
    provider: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: String,
) -> GatewayError {
    match status {
        429 => GatewayError::rate_limited(provider, retry_after),
        400 | 422 => GatewayError::malformed(provider, status, body),
        401 | 403 => GatewayError::authentication(provider, format!("Upstream rejected credential ({status})")),
        500..=599 => GatewayError::provider(provider, error_message(&body), Some(status), true),
        _ => GatewayError::provider(provider, error_message(&body), Some(status), false),
    }
}

/// `Retry-After` in seconds, if the header is present and numeric
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[async_trait]
impl UpstreamModel for OpenAiCompatibleClient {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    async fn complete(
        &self,
        credential: Option<&Credential>,
        request: &ModelRequest,
    ) -> GatewayResult<ModelReply> {
        let body = self.transform_request(request);
        let key = credential.map_or_else(|| "none".to_string(), Credential::masked);

        debug!(
            provider = %self.config.id,
            model = %request.model,
            tools = request.tools.len(),
            json_mode = request.json_mode,
            key = %key,
            "Sending upstream request"
        );

        let mut builder = self.client.post(&self.completions_url).json(&body);
        if let Some(credential) = credential {
            builder = builder.bearer_auth(credential.expose());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::timeout(&self.config.id, self.config.timeout)
            } else {
                GatewayError::provider(&self.config.id, format!("Request failed: {e}"), None, true)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = %self.config.id,
                model = %request.model,
                status = status.as_u16(),
                "Upstream returned error status"
            );
            return Err(classify_status(&self.config.id, status.as_u16(), retry_after, body));
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::timeout(&self.config.id, self.config.timeout)
            } else {
                GatewayError::provider(&self.config.id, format!("Failed to read response: {e}"), None, true)
            }
        })?;
        trace!(provider = %self.config.id, body = %text, "Upstream response body");

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::provider(&self.config.id, format!("Failed to parse response: {e}"), None, false)
        })?;

        self.transform_response(parsed)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<gateway_core::ChatMessage> for WireMessage {
    fn from(message: gateway_core::ChatMessage) -> Self {
        let has_calls = message.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
        let content = if message.content.is_empty() && has_calls {
            None
        } else {
            Some(message.content)
        };

        Self {
            role: message.role.to_string(),
            content,
            name: message.name,
            tool_calls: message.tool_calls.filter(|c| !c.is_empty()),
            tool_call_id: message.tool_call_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    tool_type: Option<String>,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ============================================================================
// Tests
// ============================================================================
