//! Message history normalization for OpenAI-compatible upstreams.
//!
//! Several providers reject empty turns or two consecutive turns from the same
//! role. Before a request is sent, empty messages are dropped and consecutive
//! plain-text messages of the same role are merged with a newline.

use gateway_core::{ChatMessage, MessageRole};

/// Drop empty messages and merge consecutive same-role text messages
#[must_use]
pub fn normalize_history(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut normalized: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for message in messages.iter().filter(|m| !m.is_empty()) {
        match normalized.last_mut() {
            Some(last) if mergeable(last, message) => {
                last.content.push('\n');
                last.content.push_str(&message.content);
            }
            _ => normalized.push(message.clone()),
        }
    }

    normalized
}

fn mergeable(previous: &ChatMessage, next: &ChatMessage) -> bool {
    previous.role == next.role
        && previous.role != MessageRole::Tool
        && is_plain(previous)
        && is_plain(next)
}

fn is_plain(message: &ChatMessage) -> bool {
    message.name.is_none()
        && message.tool_call_id.is_none()
        && message.tool_calls.as_ref().map_or(true, Vec::is_empty)
}
