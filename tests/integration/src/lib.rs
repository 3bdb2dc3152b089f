//! Integration tests for the agent gateway engine
//!
//! This crate provides integration tests covering:
//! - Sessions over OpenAI-compatible HTTP upstreams
//! - Priority chain rotation and fail-over
//! - Key quarantine, retirement and release on cancellation
//! - Recovery of rejected generations

pub mod fixtures;
pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod recovery_tests;
