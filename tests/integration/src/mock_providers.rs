//! Mock OpenAI-compatible upstreams for integration testing
//!
//! Each mock is a wiremock server answering `POST /v1/chat/completions`.
//! Responses mounted with `once_*` are consumed in mounting order; the
//! unbounded `always_*` variants serve every remaining call.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Mock upstream provider
pub struct MockUpstream {
    pub server: MockServer,
}

impl MockUpstream {
    /// Start a new mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to put in the provider configuration
    pub fn base_url(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Request bodies received so far
    pub async fn bodies(&self) -> Vec<Value> {
        self.requests()
            .await
            .iter()
            .map(|r| serde_json::from_slice(&r.body).expect("json request body"))
            .collect()
    }

    /// Number of completion calls received
    pub async fn calls(&self) -> usize {
        self.requests().await.len()
    }

    async fn mount(&self, template: ResponseTemplate, times: Option<u64>) {
        let mock = Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(template);
        match times {
            Some(n) => mock.up_to_n_times(n).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }

    /// Answer the next call with text
    pub async fn once_text(&self, content: &str) {
        self.mount(ResponseTemplate::new(200).set_body_json(chat_response(content)), Some(1))
            .await;
    }

    /// Answer every call with text
    pub async fn always_text(&self, content: &str) {
        self.mount(ResponseTemplate::new(200).set_body_json(chat_response(content)), None)
            .await;
    }

    /// Answer the next call with a native tool call
    pub async fn once_tool_call(&self, name: &str, arguments: Value) {
        self.mount(
            ResponseTemplate::new(200).set_body_json(tool_call_response(name, &arguments)),
            Some(1),
        )
        .await;
    }

    /// Rate limit every call
    pub async fn always_rate_limited(&self) {
        self.mount(
            ResponseTemplate::new(429)
                .set_body_json(error_response("rate_limit_exceeded", "Rate limit reached"))
                .append_header("Retry-After", "60"),
            None,
        )
        .await;
    }

    /// Reject every key
    pub async fn always_unauthorized(&self) {
        self.mount(
            ResponseTemplate::new(401)
                .set_body_json(error_response("invalid_api_key", "Invalid API Key")),
            None,
        )
        .await;
    }

    /// Reject the next call with a `failed_generation` body
    pub async fn once_failed_generation(&self, generation: &str) {
        let body = json!({
            "error": {
                "message": "Failed to call a function. Please adjust your prompt.",
                "type": "invalid_request_error",
                "code": "tool_use_failed",
                "failed_generation": generation,
            }
        });
        self.mount(ResponseTemplate::new(400).set_body_json(body), Some(1))
            .await;
    }

    /// Answer every call with text after a delay
    pub async fn always_delayed(&self, content: &str, delay: Duration) {
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(chat_response(content))
                .set_delay(delay),
            None,
        )
        .await;
    }
}

/// Chat completion body with text content
pub fn chat_response(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "mock",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

/// Chat completion body with one native tool call
pub fn tool_call_response(name: &str, arguments: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "mock",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_0",
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

/// OpenAI style error body
pub fn error_response(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": "invalid_request_error",
            "code": code
        }
    })
}
