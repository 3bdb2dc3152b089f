//! Key manager: acquire/release over per-provider pools.
//!
//! Each provider pool sits behind its own `parking_lot::Mutex`, so providers
//! never contend with each other. A guard is never held across an `.await`.

use crate::key_pool::{KeyPool, PoolStatus, ReleaseEffect, ReleaseOutcome};
use async_trait::async_trait;
use gateway_core::{Credential, GatewayError, GatewayResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Credential acquisition contract.
///
/// The in-process [`KeyManager`] implements it; a shared-store implementation
/// must keep pop-or-sweep-or-fail and release as atomic operations.
#[async_trait]
pub trait CredentialBroker: Send + Sync + std::fmt::Debug {
    /// Take a credential for the provider
    async fn acquire(&self, provider: &str) -> GatewayResult<Credential>;

    /// Return a credential with the outcome of the call it was used for
    async fn release(&self, credential: Credential, outcome: ReleaseOutcome);
}

/// Key manager configuration
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Quarantine rate-limited keys
    pub quarantine_enabled: bool,
    /// Quarantine length
    pub quarantine_duration: Duration,
    /// Background sweeper period
    pub sweep_interval: Duration,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            quarantine_enabled: true,
            quarantine_duration: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl KeyManagerConfig {
    /// Set quarantine duration
    #[must_use]
    pub fn with_quarantine_duration(mut self, duration: Duration) -> Self {
        self.quarantine_duration = duration;
        self
    }

    /// Enable or disable quarantine
    #[must_use]
    pub fn with_quarantine_enabled(mut self, enabled: bool) -> Self {
        self.quarantine_enabled = enabled;
        self
    }

    /// Set sweeper period
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// In-process credential manager
#[derive(Debug)]
pub struct KeyManager {
    pools: HashMap<String, Mutex<KeyPool>>,
    config: KeyManagerConfig,
}

impl KeyManager {
    /// Create a manager from credentials grouped by provider
    #[must_use]
    pub fn new(config: KeyManagerConfig, credentials: BTreeMap<String, Vec<Credential>>) -> Self {
        let pools = credentials
            .into_iter()
            .map(|(provider, keys)| {
                let pool = KeyPool::new(provider.clone(), keys);
                info!(
                    provider = %provider,
                    keys = pool.status().total,
                    "Key pool initialized"
                );
                (provider, Mutex::new(pool))
            })
            .collect();

        Self { pools, config }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }

    /// Whether a pool exists for the provider
    #[must_use]
    pub fn contains_provider(&self, provider: &str) -> bool {
        self.pools.contains_key(provider)
    }

    /// Take the next available credential
    pub fn try_acquire(&self, provider: &str) -> GatewayResult<Credential> {
        let pool = self
            .pools
            .get(provider)
            .ok_or_else(|| GatewayError::no_key(provider))?;

        let acquired = pool.lock().acquire(Instant::now());
        match acquired {
            Some(credential) => {
                debug!(provider = %provider, key = %credential, "Key acquired");
                Ok(credential)
            }
            None => {
                warn!(provider = %provider, "Key pool exhausted");
                Err(GatewayError::no_key(provider))
            }
        }
    }

    /// Return a credential
    pub fn give_back(&self, credential: Credential, outcome: &ReleaseOutcome) {
        let Some(pool) = self.pools.get(credential.provider()) else {
            warn!(provider = %credential.provider(), key = %credential, "Release for unknown provider");
            return;
        };

        let quarantine = self
            .config
            .quarantine_enabled
            .then_some(self.config.quarantine_duration);
        let key = credential.masked();
        let provider = credential.provider().to_string();
        let effect = pool
            .lock()
            .release(credential, outcome, Instant::now(), quarantine);

        match effect {
            ReleaseEffect::Requeued => debug!(provider = %provider, key = %key, "Key released"),
            ReleaseEffect::Quarantined(_) => warn!(
                provider = %provider,
                key = %key,
                duration_secs = self.config.quarantine_duration.as_secs(),
                "Key quarantined"
            ),
            ReleaseEffect::Retired => error!(
                provider = %provider,
                key = %key,
                reason = ?outcome,
                "Key retired"
            ),
            ReleaseEffect::Ignored => {
                warn!(provider = %provider, key = %key, "Release of a key that was not leased");
            }
        }
    }

    /// Requeue expired quarantine entries in every pool; returns how many were released
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut released = 0;
        for (provider, pool) in &self.pools {
            let keys = pool.lock().sweep(now);
            for key in &keys {
                info!(provider = %provider, key = %key, "Key released from quarantine");
            }
            released += keys.len();
        }
        released
    }

    /// Partition counts per provider
    #[must_use]
    pub fn status(&self) -> BTreeMap<String, PoolStatus> {
        self.pools
            .iter()
            .map(|(provider, pool)| (provider.clone(), pool.lock().status()))
            .collect()
    }

    /// Start the periodic quarantine sweeper.
    ///
    /// The task holds only a weak reference and stops on its own once the
    /// manager is dropped; the returned handle stops it earlier.
    #[must_use]
    pub fn spawn_quarantine_sweeper(self: &Arc<Self>) -> QuarantineSweeper {
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sweep_expired();
            }
        });

        QuarantineSweeper {
            handle: Some(handle),
        }
    }
}

#[async_trait]
impl CredentialBroker for KeyManager {
    async fn acquire(&self, provider: &str) -> GatewayResult<Credential> {
        self.try_acquire(provider)
    }

    async fn release(&self, credential: Credential, outcome: ReleaseOutcome) {
        self.give_back(credential, &outcome);
    }
}

/// Handle to the background quarantine sweeper
#[derive(Debug)]
pub struct QuarantineSweeper {
    handle: Option<JoinHandle<()>>,
}

impl QuarantineSweeper {
    /// Stop the sweeper
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether the sweeper task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for QuarantineSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::KeyKind;
    use std::collections::HashSet;

    fn manager(n: usize, config: KeyManagerConfig) -> KeyManager {
        let keys = (0..n)
            .map(|i| Credential::new("groq", i, KeyKind::Free, format!("gsk_test_secret_{i:04}")))
            .collect();
        let mut credentials = BTreeMap::new();
        credentials.insert("groq".to_string(), keys);
        KeyManager::new(config, credentials)
    }

    #[tokio::test]
    async fn test_unknown_provider_has_no_key() {
        let manager = manager(1, KeyManagerConfig::default());
        let result = manager.acquire("openai").await;
        assert!(matches!(result, Err(GatewayError::NoKeyAvailable { .. })));
    }

    #[tokio::test]
    async fn test_exhausted_pool_fails_fast() {
        let manager = manager(1, KeyManagerConfig::default());
        let _held = manager.acquire("groq").await.expect("key");
        let result = manager.acquire("groq").await;
        assert!(matches!(result, Err(GatewayError::NoKeyAvailable { provider }) if provider == "groq"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantine_respects_duration() {
        let config = KeyManagerConfig::default().with_quarantine_duration(Duration::from_secs(300));
        let manager = manager(1, config);

        let key = manager.acquire("groq").await.expect("key");
        manager.release(key, ReleaseOutcome::RateLimited).await;
        assert_eq!(manager.status()["groq"].quarantined, 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(manager.acquire("groq").await.is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let again = manager.acquire("groq").await.expect("released after quarantine");
        assert_eq!(again.index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_requeues() {
        let config = KeyManagerConfig::default()
            .with_quarantine_duration(Duration::from_secs(30))
            .with_sweep_interval(Duration::from_secs(10));
        let manager = Arc::new(manager(1, config));
        let sweeper = manager.spawn_quarantine_sweeper();

        let key = manager.acquire("groq").await.expect("key");
        manager.release(key, ReleaseOutcome::RateLimited).await;

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(manager.status()["groq"].available, 1);
        assert!(sweeper.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_acquire_is_mutually_exclusive() {
        let manager = Arc::new(manager(16, KeyManagerConfig::default()));
        let mut handles = Vec::new();

        for _ in 0..32 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.acquire("groq").await.ok() }));
        }

        let mut seen = HashSet::new();
        let mut granted = 0;
        for handle in handles {
            if let Some(key) = handle.await.expect("task") {
                granted += 1;
                assert!(seen.insert(key.index()), "key handed out twice");
            }
        }
        assert_eq!(granted, 16);
        assert_eq!(manager.status()["groq"].leased, 16);
    }

    #[tokio::test]
    async fn test_cancelled_release_is_neutral() {
        let manager = manager(2, KeyManagerConfig::default());
        let key = manager.acquire("groq").await.expect("key");
        manager.release(key, ReleaseOutcome::Success).await;
        let status = manager.status()["groq"];
        assert_eq!(status.available, 2);
        assert_eq!(status.quarantined, 0);
    }
}
