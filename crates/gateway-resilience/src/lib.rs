//! # Gateway Resilience
//!
//! Failure handling for the agent gateway engine:
//! - Per-provider credential pools with quarantine and retirement
//! - The key manager and its background quarantine sweeper
//! - Backoff between fail-over attempts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod key_manager;
pub mod key_pool;

// Re-export main types
pub use backoff::{BackoffConfig, BackoffPolicy};
pub use key_manager::{CredentialBroker, KeyManager, KeyManagerConfig, QuarantineSweeper};
pub use key_pool::{KeyPool, PoolStatus, ReleaseEffect, ReleaseOutcome};
