//! Per-provider credential pool.
//!
//! Every credential is in exactly one of four places: the available FIFO,
//! the quarantine map, the retired map, or leased to a caller. The pool is
//! plain data; the key manager wraps each pool in its own lock and supplies
//! the clock.

use gateway_core::Credential;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome reported when a leased credential is returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Call succeeded (also used for cancellations)
    Success,
    /// Call failed for a reason unrelated to the credential
    RecoverableError,
    /// Upstream rate-limited this credential
    RateLimited,
    /// Upstream rejected this credential permanently
    Revoked(String),
}

/// What a release did to the credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseEffect {
    /// Pushed to the tail of the available queue
    Requeued,
    /// Moved to quarantine until the given instant
    Quarantined(Instant),
    /// Removed from rotation for good
    Retired,
    /// Credential was not leased from this pool
    Ignored,
}

/// Counts per partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Ready to be acquired
    pub available: usize,
    /// Waiting out a rate limit
    pub quarantined: usize,
    /// Permanently removed
    pub retired: usize,
    /// Currently held by callers
    pub leased: usize,
    /// All credentials ever loaded
    pub total: usize,
}

#[derive(Debug)]
struct Quarantined {
    credential: Credential,
    until: Instant,
}

/// Credential pool for one provider
#[derive(Debug)]
pub struct KeyPool {
    provider: String,
    available: VecDeque<Credential>,
    quarantined: HashMap<usize, Quarantined>,
    retired: HashMap<usize, (Credential, String)>,
    leased: HashSet<usize>,
    total: usize,
}

impl KeyPool {
    /// Create a pool; credentials of other providers and duplicates are ignored
    pub fn new(provider: impl Into<String>, credentials: Vec<Credential>) -> Self {
        let provider = provider.into();
        let mut seen = HashSet::new();
        let available: VecDeque<Credential> = credentials
            .into_iter()
            .filter(|c| c.provider() == provider && seen.insert(c.index()))
            .collect();
        let total = available.len();

        Self {
            provider,
            available,
            quarantined: HashMap::new(),
            retired: HashMap::new(),
            leased: HashSet::new(),
            total,
        }
    }

    /// Provider this pool serves
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Pop the head of the queue, sweeping quarantine once if the queue is empty
    pub fn acquire(&mut self, now: Instant) -> Option<Credential> {
        if self.available.is_empty() {
            self.sweep(now);
        }
        let credential = self.available.pop_front()?;
        self.leased.insert(credential.index());
        Some(credential)
    }

    /// Requeue every quarantined credential whose release time has passed,
    /// earliest expiry first. Returns the requeued credentials.
    pub fn sweep(&mut self, now: Instant) -> Vec<Credential> {
        let mut expired: Vec<(Instant, usize)> = self
            .quarantined
            .iter()
            .filter(|(_, q)| q.until <= now)
            .map(|(&index, q)| (q.until, index))
            .collect();
        expired.sort_unstable();

        let mut released = Vec::with_capacity(expired.len());
        for (_, index) in expired {
            if let Some(entry) = self.quarantined.remove(&index) {
                self.available.push_back(entry.credential.clone());
                released.push(entry.credential);
            }
        }
        released
    }

    /// Return a leased credential.
    ///
    /// `quarantine` is the quarantine duration, or `None` when quarantine is
    /// disabled (rate-limited credentials are then requeued).
    pub fn release(
        &mut self,
        credential: Credential,
        outcome: &ReleaseOutcome,
        now: Instant,
        quarantine: Option<Duration>,
    ) -> ReleaseEffect {
        if credential.provider() != self.provider || !self.leased.remove(&credential.index()) {
            return ReleaseEffect::Ignored;
        }

        match (outcome, quarantine) {
            (ReleaseOutcome::RateLimited, Some(duration)) => {
                let until = now + duration;
                self.quarantined
                    .insert(credential.index(), Quarantined { credential, until });
                ReleaseEffect::Quarantined(until)
            }
            (ReleaseOutcome::Revoked(reason), _) => {
                self.retired
                    .insert(credential.index(), (credential, reason.clone()));
                ReleaseEffect::Retired
            }
            _ => {
                self.available.push_back(credential);
                ReleaseEffect::Requeued
            }
        }
    }

    /// Reason a credential was retired, if it was
    #[must_use]
    pub fn retired_reason(&self, credential: &Credential) -> Option<&str> {
        self.retired
            .get(&credential.index())
            .map(|(_, reason)| reason.as_str())
    }

    /// Earliest quarantine release instant, if any
    #[must_use]
    pub fn next_release(&self) -> Option<Instant> {
        self.quarantined.values().map(|q| q.until).min()
    }

    /// Partition counts
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            available: self.available.len(),
            quarantined: self.quarantined.len(),
            retired: self.retired.len(),
            leased: self.leased.len(),
            total: self.total,
        }
    }
}
