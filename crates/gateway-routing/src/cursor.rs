//! Rotation cursors.
//!
//! A cursor is a per-key counter that only ever grows. Callers reduce the
//! returned value modulo their chain length, so concurrent lost updates can
//! only bias fairness, never produce an out-of-range offset.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fetch-and-increment contract shared by in-process and external cursors
#[async_trait]
pub trait RotationCursor: Send + Sync + std::fmt::Debug {
    /// Return the current value for `key` and advance it by one
    async fn next_offset(&self, key: &str) -> u64;
}

/// Process-local cursor backed by atomics
#[derive(Debug, Default)]
pub struct InMemoryRotationCursor {
    counters: DashMap<String, AtomicU64>,
}

impl InMemoryRotationCursor {
    /// Create an empty cursor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key with a starting value
    pub fn seed(&self, key: impl Into<String>, value: u64) {
        self.counters.insert(key.into(), AtomicU64::new(value));
    }

    /// Current value without advancing
    #[must_use]
    pub fn peek(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map_or(0, |c| c.load(Ordering::Acquire))
    }
}

#[async_trait]
impl RotationCursor for InMemoryRotationCursor {
    async fn next_offset(&self, key: &str) -> u64 {
        if let Some(counter) = self.counters.get(key) {
            return counter.fetch_add(1, Ordering::AcqRel);
        }
        self.counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::AcqRel)
    }
}
