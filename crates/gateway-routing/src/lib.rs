//! # Gateway Routing
//!
//! Failover chain resolution for the agent gateway engine.
//!
//! This crate provides:
//! - Tier resolution with cycle protection
//! - Rotation cursors (in-process, or any shared store behind the same trait)
//! - Rotated per-session priority chains

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod cursor;
pub mod rotation;
pub mod tier;

// Re-export main types
pub use chain::PriorityChain;
pub use cursor::{InMemoryRotationCursor, RotationCursor};
pub use rotation::RotationManager;
pub use tier::TierResolver;
