//! Recovery of malformed upstream responses.
//!
//! Some providers reject their own model output with a 400/422 and echo it
//! back as `failed_generation`. The generation is usually a perfectly usable
//! tool call or answer, so it is salvaged instead of failing over.

use crate::normalize::{find_balanced_object, Extracted, ExtractedToolCall, ResponseNormalizer};
use serde_json::Value;
use tracing::{debug, warn};

const FAILED_GENERATION: &str = "failed_generation";

const JSON_MODE_MARKERS: [&str; 4] = ["response_format", "json mode", "json_mode", "json_object"];
const UNSUPPORTED_MARKERS: [&str; 4] = [
    "not supported",
    "unsupported",
    "does not support",
    "incompatible",
];

/// Action salvaged from a failed generation
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveredAction {
    /// Execute the tool the model tried to call
    ExecuteTool {
        /// The recovered call
        call: ExtractedToolCall,
        /// Generation text as produced by the model
        generation: String,
    },
    /// Treat the generation as the final answer
    Answer {
        /// Answer text
        text: String,
    },
}

/// Why a malformed response could not be salvaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotRecoverableKind {
    /// The upstream refused JSON mode
    JsonModeUnsupported,
    /// Anything else
    Generic,
}

impl NotRecoverableKind {
    /// Label used in metrics and audit metadata
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonModeUnsupported => "json_mode_unsupported",
            Self::Generic => "generic",
        }
    }
}

/// Result of a recovery attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Apply the action without failing over
    Recovered(RecoveredAction),
    /// Fail over (or drop JSON mode)
    NotRecoverable(NotRecoverableKind),
}

/// Interceptor for 400/422 responses
#[derive(Debug, Clone, Default)]
pub struct RecoveryInterceptor {
    normalizer: ResponseNormalizer,
}

impl RecoveryInterceptor {
    /// Create an interceptor that extracts with `normalizer`
    #[must_use]
    pub fn new(normalizer: ResponseNormalizer) -> Self {
        Self { normalizer }
    }

    /// Try to salvage a rejected response
    #[must_use]
    pub fn try_recover(&self, status: u16, body: &str, offered_tools: &[String]) -> Recovery {
        if status != 400 && status != 422 {
            return Recovery::NotRecoverable(NotRecoverableKind::Generic);
        }

        let Some(generation) = parse_body(body).as_ref().and_then(find_failed_generation) else {
            if mentions_json_mode_rejection(body) {
                debug!(status, "Upstream rejected JSON mode");
                return Recovery::NotRecoverable(NotRecoverableKind::JsonModeUnsupported);
            }
            return Recovery::NotRecoverable(NotRecoverableKind::Generic);
        };

        match self.normalizer.extract_from_text(&generation) {
            Extracted::ToolCall(call) => {
                if offered_tools.iter().any(|tool| *tool == call.name) {
                    debug!(tool = %call.name, "Recovered tool call from failed generation");
                    Recovery::Recovered(RecoveredAction::ExecuteTool { call, generation })
                } else {
                    warn!(tool = %call.name, "Failed generation names a tool that was not offered");
                    Recovery::NotRecoverable(NotRecoverableKind::Generic)
                }
            }
            Extracted::PlainText(text) if !text.trim().is_empty() => {
                debug!("Recovered answer from failed generation");
                Recovery::Recovered(RecoveredAction::Answer { text })
            }
            Extracted::PlainText(_) => Recovery::NotRecoverable(NotRecoverableKind::Generic),
        }
    }
}

/// Body as JSON, or the first JSON object embedded in it
fn parse_body(body: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    let start = body.find('{')?;
    let end = find_balanced_object(body, start)?;
    serde_json::from_str(&body[start..=end]).ok()
}

/// Depth-first search for a `failed_generation` field
fn find_failed_generation(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(FAILED_GENERATION) {
                return match found {
                    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                    Value::String(_) | Value::Null => None,
                    other => Some(other.to_string()),
                };
            }
            map.values().find_map(find_failed_generation)
        }
        Value::Array(items) => items.iter().find_map(find_failed_generation),
        _ => None,
    }
}

fn mentions_json_mode_rejection(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    JSON_MODE_MARKERS.iter().any(|m| lower.contains(m))
        && UNSUPPORTED_MARKERS.iter().any(|m| lower.contains(m))
}
