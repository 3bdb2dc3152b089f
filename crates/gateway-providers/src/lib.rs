//! # Gateway Providers
//!
//! Upstream model clients for the agent gateway engine.
//!
//! Every provider is reached through the OpenAI-compatible chat-completions
//! dialect; hosted and local endpoints differ only in base URL and whether a
//! pooled credential is attached.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod history;
pub mod openai_compat;
pub mod registry;

// Re-export main types
pub use history::normalize_history;
pub use openai_compat::{classify_status, OpenAiCompatibleClient, OpenAiCompatibleConfig};
pub use registry::ProviderRegistry;
