//! # Gateway Agents
//!
//! The reasoning loop of the agent gateway engine.
//!
//! This crate provides:
//! - [`Executor`]: runs sessions step by step over a rotated priority chain
//! - [`ResponseNormalizer`]: tool call or plain text from any upstream reply
//! - [`RecoveryInterceptor`]: salvages `failed_generation` rejections
//! - Reasoning patterns and system prompt assembly
//! - Tool execution and progress notification contracts
//!
//! ## Example
//!
//! ```ignore
//! use gateway_agents::Executor;
//! use gateway_core::{ChatMessage, RequestOptions};
//!
//! let executor = Executor::builder(snapshot).tools(tools).build()?;
//! let handle = executor.start_session(
//!     "standard",
//!     vec![ChatMessage::user("What changed in Rust 1.75?")],
//!     RequestOptions::new(),
//! )?;
//! let answer = handle.outcome().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod executor;
pub mod normalize;
pub mod notify;
pub mod pattern;
pub mod recovery;
pub mod session;
pub mod tools;

// Re-export main types
pub use events::{FailureKind, SessionEvent, SessionFailure};
pub use executor::{backoff_policy, Executor, ExecutorBuilder, ExecutorConfig, SessionHandle};
pub use normalize::{find_balanced_object, Extracted, ExtractedToolCall, ResponseNormalizer};
pub use notify::{NoOpNotifier, ProgressNotifier, ProgressTask};
pub use pattern::{
    build_final_prompt, PatternRegistry, PromptContext, ReasoningPattern, DEFAULT_CONTINUE_PROMPT,
    DEFAULT_PATTERN,
};
pub use recovery::{NotRecoverableKind, RecoveredAction, Recovery, RecoveryInterceptor};
pub use session::{Scratchpad, ScratchpadEntry, Session, SessionState};
pub use tools::{NoTools, ToolError, ToolExecutor};
