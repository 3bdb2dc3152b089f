//! # Gateway Core
//!
//! Core types, traits, and error handling for the agent gateway engine.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Chat message and tool types for upstream calls
//! - The upstream model trait
//! - Credentials with masked display
//! - The error taxonomy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod types;

// Re-export commonly used types
pub use error::{AttemptFailure, FailureClass, GatewayError, GatewayResult};
pub use provider::{ModelCapabilities, ModelReply, UpstreamModel};
pub use request::{
    ChatMessage, FunctionCall, FunctionDefinition, MessageRole, ModelRequest, RequestOptions,
    ToolCall, ToolChoice, ToolDefinition,
};
pub use types::{mask_secret, Credential, KeyKind, SessionId};
