//! Periodic reclamation of expired cache entries and idle identities.
//!
//! The sweep passes are plain synchronous methods so they can run and be
//! tested without a runtime; with the `async` feature a supervised tokio
//! task runs them on their configured intervals until shut down.

use crate::application::accounts::AccountRegistry;
use crate::application::cache::{CacheEntry, ResponseCache};
use crate::application::ports::StateStore;
use crate::domain::key::CacheKey;
use crate::domain::usage::RateLimitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "async")]
use tokio::sync::watch;
#[cfg(feature = "async")]
use tokio::time::interval;

/// Error returned when sweep configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepConfigError {
    /// Cache sweep interval must be greater than zero
    ZeroCacheInterval,
    /// Idle-state sweep interval must be greater than zero
    ZeroStateInterval,
}

impl std::fmt::Display for SweepConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepConfigError::ZeroCacheInterval => {
                write!(f, "cache sweep interval must be greater than 0")
            }
            SweepConfigError::ZeroStateInterval => {
                write!(f, "idle-state sweep interval must be greater than 0")
            }
        }
    }
}

impl std::error::Error for SweepConfigError {}

/// How often each sweep pass runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Interval between expired-entry sweeps of the cache
    pub cache_interval: Duration,
    /// Interval between idle-identity sweeps of admission state
    pub state_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cache_interval: Duration::from_secs(600),
            state_interval: Duration::from_secs(3600),
        }
    }
}

impl SweepConfig {
    /// Create a sweep config with the specified intervals.
    ///
    /// # Errors
    /// Returns an error if either interval is zero.
    pub fn new(
        cache_interval: Duration,
        state_interval: Duration,
    ) -> Result<Self, SweepConfigError> {
        if cache_interval.is_zero() {
            return Err(SweepConfigError::ZeroCacheInterval);
        }
        if state_interval.is_zero() {
            return Err(SweepConfigError::ZeroStateInterval);
        }
        Ok(Self {
            cache_interval,
            state_interval,
        })
    }
}

/// What one combined sweep reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Expired cache entries removed
    pub expired_entries: usize,
    /// Idle identities whose admission state was removed
    pub idle_identities: usize,
}

/// Runs the reclamation passes over shared admission and cache state.
///
/// Holds clones of the registry and cache, so sweeps observe the same
/// storage the hot path mutates.
pub struct Sweeper<A, C>
where
    A: StateStore<String, RateLimitState> + Clone,
    C: StateStore<CacheKey, CacheEntry> + Clone,
{
    accounts: AccountRegistry<A>,
    cache: ResponseCache<C>,
    config: SweepConfig,
}

impl<A, C> Sweeper<A, C>
where
    A: StateStore<String, RateLimitState> + Clone,
    C: StateStore<CacheKey, CacheEntry> + Clone,
{
    /// Create a sweeper over the given registry and cache.
    pub fn new(accounts: AccountRegistry<A>, cache: ResponseCache<C>, config: SweepConfig) -> Self {
        Self {
            accounts,
            cache,
            config,
        }
    }

    /// Remove expired cache entries. Returns the number removed.
    pub fn sweep_cache(&self) -> usize {
        self.cache.remove_expired()
    }

    /// Remove admission state for identities idle past the retention
    /// window. Returns the number removed.
    pub fn sweep_idle(&self) -> usize {
        self.accounts.remove_idle()
    }

    /// Run both passes once.
    pub fn sweep_all(&self) -> SweepReport {
        SweepReport {
            expired_entries: self.sweep_cache(),
            idle_identities: self.sweep_idle(),
        }
    }

    /// Get the sweep configuration.
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Start the periodic sweep loop (async version).
    ///
    /// Spawns a background task that runs each pass at its configured
    /// interval. The returned handle stops the loop cleanly; dropping the
    /// handle also stops it.
    #[cfg(feature = "async")]
    pub fn start(self) -> SweeperHandle
    where
        A: 'static,
        C: 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut cache_tick = interval(self.config.cache_interval);
            let mut state_tick = interval(self.config.state_interval);

            loop {
                tokio::select! {
                    _ = cache_tick.tick() => {
                        self.sweep_cache();
                    }
                    _ = state_tick.tick() => {
                        self.sweep_idle();
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("sweeper stopped");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Handle to a running sweep loop.
#[cfg(feature = "async")]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "async")]
impl SweeperHandle {
    /// Signal the loop to stop and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Stop the loop without waiting for it.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::{CacheConfig, SetOptions};
    use crate::application::metrics::Metrics;
    use crate::application::ports::Clock;
    use crate::domain::tier::{PolicyTable, Tier};
    use crate::infrastructure::mocks::clock::MockClock;
    use crate::infrastructure::store::ShardedStore;
    use std::sync::Arc;

    type AccountStore = Arc<ShardedStore<String, RateLimitState>>;
    type CacheStore = Arc<ShardedStore<CacheKey, CacheEntry>>;

    fn fixture() -> (
        Arc<MockClock>,
        AccountRegistry<AccountStore>,
        ResponseCache<CacheStore>,
        Sweeper<AccountStore, CacheStore>,
    ) {
        let clock = Arc::new(MockClock::new());
        let accounts = AccountRegistry::new(
            Arc::new(ShardedStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            PolicyTable::default(),
        );
        let cache = ResponseCache::new(
            Arc::new(ShardedStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            CacheConfig::default(),
            Metrics::new(),
        );
        let sweeper = Sweeper::new(accounts.clone(), cache.clone(), SweepConfig::default());
        (clock, accounts, cache, sweeper)
    }

    #[test]
    fn test_sweep_cache_removes_only_expired_entries() {
        let (clock, _accounts, cache, sweeper) = fixture();

        cache.set(
            CacheKey::simple("op", "short"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Starter).with_ttl(Duration::from_secs(60)),
        );
        cache.set(
            CacheKey::simple("op", "long"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Starter).with_ttl(Duration::from_secs(600)),
        );

        clock.advance(Duration::from_secs(61));

        assert_eq!(sweeper.sweep_cache(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.inspect(CacheKey::simple("op", "long")).is_some());
    }

    #[test]
    fn test_sweep_idle_removes_stale_identities() {
        let (clock, accounts, _cache, sweeper) = fixture();

        accounts.with_account("stale", Tier::Free, |_state, _policy, _now| {});
        clock.advance(Duration::from_secs(2 * 3600));
        accounts.with_account("fresh", Tier::Free, |_state, _policy, _now| {});

        // 25h after "stale" was last seen, 23h after "fresh".
        clock.advance(Duration::from_secs(23 * 3600));

        assert_eq!(sweeper.sweep_idle(), 1);
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn test_sweep_all_reports_both_passes() {
        let (clock, accounts, cache, sweeper) = fixture();

        accounts.with_account("stale", Tier::Free, |_state, _policy, _now| {});
        cache.set(
            CacheKey::simple("op", "short"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Starter).with_ttl(Duration::from_secs(60)),
        );

        clock.advance(Duration::from_secs(25 * 3600));

        let report = sweeper.sweep_all();
        assert_eq!(
            report,
            SweepReport {
                expired_entries: 1,
                idle_identities: 1,
            }
        );
        assert!(cache.is_empty());
        assert!(accounts.is_empty());
    }

    #[test]
    fn test_sweep_on_fresh_state_is_a_no_op() {
        let (_clock, _accounts, _cache, sweeper) = fixture();
        assert_eq!(sweeper.sweep_all(), SweepReport::default());
    }

    #[test]
    fn test_sweep_config_rejects_zero_intervals() {
        assert_eq!(
            SweepConfig::new(Duration::ZERO, Duration::from_secs(1)),
            Err(SweepConfigError::ZeroCacheInterval)
        );
        assert_eq!(
            SweepConfig::new(Duration::from_secs(1), Duration::ZERO),
            Err(SweepConfigError::ZeroStateInterval)
        );
        assert!(SweepConfig::new(Duration::from_secs(600), Duration::from_secs(3600)).is_ok());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_sweep_loop_reclaims_and_shuts_down() {
        use crate::infrastructure::clock::SystemClock;

        let clock = Arc::new(SystemClock::new());
        let accounts = AccountRegistry::new(
            Arc::new(ShardedStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            PolicyTable::default(),
        );
        let cache = ResponseCache::new(
            Arc::new(ShardedStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            CacheConfig::default(),
            Metrics::new(),
        );

        // Already expired when the first sweep runs.
        cache.set(
            CacheKey::simple("op", "doomed"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Starter).with_ttl(Duration::ZERO),
        );

        let config =
            SweepConfig::new(Duration::from_millis(20), Duration::from_millis(50)).unwrap();
        let handle = Sweeper::new(accounts, cache.clone(), config).start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.is_empty());

        handle.shutdown().await;
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_dropped_handle_stops_the_loop() {
        let (_clock, accounts, cache, _sweeper) = fixture();
        let config =
            SweepConfig::new(Duration::from_millis(20), Duration::from_millis(20)).unwrap();

        let handle = Sweeper::new(accounts, cache, config).start();
        let task = handle.task;
        drop(handle.shutdown_tx);

        // The loop observes the closed channel and exits on its own.
        let joined = tokio::time::timeout(Duration::from_millis(500), task).await;
        assert!(joined.is_ok());
    }
}
