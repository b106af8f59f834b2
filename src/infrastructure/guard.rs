//! Admission and caching facade.
//!
//! Wires storage, clock, policy table, metrics, cache, and sweepers into a
//! single handle that sits in front of an expensive request path.

use crate::application::{
    accounts::AccountRegistry,
    cache::{
        CacheConfig, CacheConfigError, CacheEntry, CacheStats, EntryMeta, EntrySnapshot,
        ResponseCache, SetOptions, TierMultipliers,
    },
    controller::{AdmissionController, CheckOptions},
    metrics::Metrics,
    ports::{Clock, StateStore},
    sweeper::{SweepConfig, SweepConfigError, SweepReport, Sweeper},
};
use crate::domain::decision::AdmissionDecision;
use crate::domain::key::CacheKey;
use crate::domain::tier::{PolicyError, PolicyTable, Tier, TierPolicy};
use crate::domain::usage::{RateLimitState, StatusSnapshot};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::store::ShardedStore;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "async")]
use crate::application::sweeper::SweeperHandle;

#[cfg(feature = "async")]
use std::sync::Mutex;

/// Error returned when building a TierGuard fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Policy table validation failed
    Policy(PolicyError),
    /// Cache configuration validation failed
    Cache(CacheConfigError),
    /// Sweep configuration validation failed
    Sweep(SweepConfigError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Policy(e) => write!(f, "policy table error: {}", e),
            BuildError::Cache(e) => write!(f, "cache configuration error: {}", e),
            BuildError::Sweep(e) => write!(f, "sweep configuration error: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<PolicyError> for BuildError {
    fn from(e: PolicyError) -> Self {
        BuildError::Policy(e)
    }
}

impl From<CacheConfigError> for BuildError {
    fn from(e: CacheConfigError) -> Self {
        BuildError::Cache(e)
    }
}

impl From<SweepConfigError> for BuildError {
    fn from(e: SweepConfigError) -> Self {
        BuildError::Sweep(e)
    }
}

/// Top-level configuration for a [`TierGuard`].
///
/// Deserializable from an application config file; every field falls back
/// to the production default when omitted.
///
/// # Example
/// ```
/// use tierguard::GuardConfig;
///
/// let config: GuardConfig = serde_json::from_str(r#"{"cache": {"max_entries": 5000}}"#).unwrap();
/// assert_eq!(config.cache.max_entries, 5000);
/// // Everything else keeps its default.
/// assert_eq!(config.policies, tierguard::PolicyTable::default());
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Per-tier admission limits
    pub policies: PolicyTable,
    /// Response cache tuning
    pub cache: CacheConfig,
    /// Sweep intervals
    pub sweep: SweepConfig,
}

impl GuardConfig {
    /// Check all nested invariants.
    ///
    /// # Errors
    /// Returns the first violated invariant as a [`BuildError`].
    pub fn validate(&self) -> Result<(), BuildError> {
        self.policies.validate()?;
        self.cache.validate()?;
        SweepConfig::new(self.sweep.cache_interval, self.sweep.state_interval)?;
        Ok(())
    }
}

/// Builder for constructing a [`TierGuard`].
pub struct TierGuardBuilder {
    config: GuardConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl TierGuardBuilder {
    /// Replace the whole configuration.
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the whole policy table.
    ///
    /// The table will be validated when `build()` is called.
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.config.policies = policies;
        self
    }

    /// Override the policy row for one tier.
    ///
    /// # Example
    ///
    /// ```
    /// use tierguard::{PolicyTable, Tier, TierGuard, TierPolicy};
    ///
    /// let mut free = *PolicyTable::default().policy(Tier::Free);
    /// free.requests_per_minute = 2;
    ///
    /// let guard = TierGuard::builder()
    ///     .with_policy(Tier::Free, free)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn with_policy(mut self, tier: Tier, policy: TierPolicy) -> Self {
        self.config.policies.set(tier, policy);
        self
    }

    /// Set the base cache TTL before tier weighting.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.default_ttl = ttl;
        self
    }

    /// Set the resident cache entry bound.
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.config.cache.max_entries = max_entries;
        self
    }

    /// Set the payload size above which entries are gzipped.
    pub fn with_compression_threshold(mut self, bytes: usize) -> Self {
        self.config.cache.compression_threshold = bytes;
        self
    }

    /// Set the per-tier TTL multipliers.
    pub fn with_tier_multipliers(mut self, multipliers: TierMultipliers) -> Self {
        self.config.cache.tier_multipliers = multipliers;
        self
    }

    /// Set the sweep intervals for the cache and idle-state passes.
    ///
    /// The intervals will be validated when `build()` is called.
    pub fn with_sweep_intervals(mut self, cache: Duration, state: Duration) -> Self {
        self.config.sweep.cache_interval = cache;
        self.config.sweep.state_interval = state;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the guard.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<TierGuard, BuildError> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        Ok(TierGuard::assemble(
            Arc::new(ShardedStore::new()),
            Arc::new(ShardedStore::new()),
            clock,
            self.config,
        ))
    }
}

/// Facade over the admission controller and the response cache.
///
/// One guard instance fronts one expensive request path: callers run
/// [`check_limit`](TierGuard::check_limit), consult the cache, and release
/// their slot with [`complete_request`](TierGuard::complete_request) when
/// the work finishes.
///
/// Cloning is cheap and every clone shares the same state, so a guard can be
/// handed to every request handler.
///
/// # Example
///
/// ```
/// use tierguard::{CacheKey, CheckOptions, SetOptions, Tier, TierGuard};
///
/// let guard = TierGuard::new();
///
/// let decision =
///     guard.check_limit("tenant-42", Tier::Starter, "copy.generate", CheckOptions::tokens(700));
/// assert!(decision.is_allowed());
///
/// let key = CacheKey::simple("copy.generate", "three taglines for a bakery");
/// if guard.cache_get::<String>(key).is_none() {
///     let response = "fresh. local. yours.".to_string();
///     guard.cache_set(
///         key,
///         &response,
///         SetOptions::new("copy.generate", "model-a", Tier::Starter),
///     );
/// }
///
/// guard.complete_request("tenant-42");
/// ```
#[derive(Clone)]
pub struct TierGuard<
    A = Arc<ShardedStore<String, RateLimitState>>,
    C = Arc<ShardedStore<CacheKey, CacheEntry>>,
> where
    A: StateStore<String, RateLimitState> + Clone,
    C: StateStore<CacheKey, CacheEntry> + Clone,
{
    controller: AdmissionController<A>,
    cache: ResponseCache<C>,
    sweep_config: SweepConfig,
    #[cfg(feature = "async")]
    sweeper_handle: Arc<Mutex<Option<SweeperHandle>>>,
}

impl<A, C> TierGuard<A, C>
where
    A: StateStore<String, RateLimitState> + Clone,
    C: StateStore<CacheKey, CacheEntry> + Clone,
{
    fn assemble(accounts_store: A, cache_store: C, clock: Arc<dyn Clock>, config: GuardConfig) -> Self {
        let metrics = Metrics::new();
        let registry = AccountRegistry::new(accounts_store, Arc::clone(&clock), config.policies);
        let controller = AdmissionController::new(registry, metrics.clone());
        let cache = ResponseCache::new(cache_store, clock, config.cache, metrics);

        Self {
            controller,
            cache,
            sweep_config: config.sweep,
            #[cfg(feature = "async")]
            sweeper_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a guard over custom state stores.
    ///
    /// This allows alternative [`StateStore`] implementations, e.g. a shared
    /// backend when best-effort per-instance quotas are not enough.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn with_stores(
        accounts_store: A,
        cache_store: C,
        clock: Arc<dyn Clock>,
        config: GuardConfig,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self::assemble(accounts_store, cache_store, clock, config))
    }

    /// Decide whether one request may proceed, recording it if admitted.
    ///
    /// `operation` names the work being gated; it appears in denial
    /// diagnostics but plays no part in the decision itself.
    ///
    /// An admitted request holds a concurrency slot until
    /// [`complete_request`](TierGuard::complete_request).
    pub fn check_limit(
        &self,
        identity: &str,
        tier: Tier,
        operation: &str,
        options: CheckOptions,
    ) -> AdmissionDecision {
        self.controller.check_limit(identity, tier, operation, options)
    }

    /// Release the concurrency slot held by an admitted request.
    pub fn complete_request(&self, identity: &str) {
        self.controller.complete_request(identity);
    }

    /// Read-only usage projection for an identity. Never creates state.
    pub fn get_status(&self, identity: &str, tier: Tier) -> StatusSnapshot {
        self.controller.get_status(identity, tier)
    }

    /// Look up a cached response.
    pub fn cache_get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        self.cache.get(key)
    }

    /// Store a response. Never fails; see [`ResponseCache::set`].
    pub fn cache_set<T: Serialize>(&self, key: CacheKey, value: &T, options: SetOptions) {
        self.cache.set(key, value, options);
    }

    /// Point-in-time cache statistics with the `top_n` most-accessed entries.
    pub fn cache_stats(&self, top_n: usize) -> CacheStats {
        self.cache.stats(top_n)
    }

    /// Metadata-only view of a resident cache entry.
    pub fn inspect(&self, key: CacheKey) -> Option<EntrySnapshot> {
        self.cache.inspect(key)
    }

    /// Remove one cache entry. Returns true if it was resident.
    pub fn invalidate(&self, key: CacheKey) -> bool {
        self.cache.invalidate(key)
    }

    /// Remove every cache entry matching the predicate. Returns the number
    /// removed.
    pub fn invalidate_matching<F>(&self, predicate: F) -> usize
    where
        F: FnMut(CacheKey, &EntryMeta) -> bool,
    {
        self.cache.invalidate_matching(predicate)
    }

    /// Run both sweep passes immediately, regardless of the schedule.
    pub fn sweep_now(&self) -> SweepReport {
        self.sweeper().sweep_all()
    }

    /// Get a reference to the metrics.
    ///
    /// One instance covers both subsystems: admission outcomes
    /// (allowed/denied/bursts/penalties) and cache behavior
    /// (hits/misses/evictions/expirations/compressions).
    pub fn metrics(&self) -> &Metrics {
        self.controller.metrics()
    }

    /// Get a reference to the underlying admission controller.
    pub fn controller(&self) -> &AdmissionController<A> {
        &self.controller
    }

    /// Get a reference to the underlying response cache.
    pub fn cache(&self) -> &ResponseCache<C> {
        &self.cache
    }

    /// Identities with resident admission state.
    pub fn tracked_identities(&self) -> usize {
        self.controller.registry().len()
    }

    fn sweeper(&self) -> Sweeper<A, C> {
        Sweeper::new(
            self.controller.registry().clone(),
            self.cache.clone(),
            self.sweep_config.clone(),
        )
    }

    /// Start the periodic sweep task.
    ///
    /// Idempotent: calling it while a sweeper is already running does
    /// nothing. **Requires the `async` feature** and a tokio runtime.
    #[cfg(feature = "async")]
    pub fn start_sweeper(&self)
    where
        A: 'static,
        C: 'static,
    {
        let mut slot = self.sweeper_handle.lock().unwrap();
        if slot.is_some() {
            tracing::debug!("sweeper already running");
            return;
        }
        *slot = Some(self.sweeper().start());
    }

    /// Stop the periodic sweep task, if running.
    ///
    /// Waits for the loop to exit cleanly. Does nothing when no sweeper was
    /// started. **Requires the `async` feature.**
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use tierguard::TierGuard;
    /// # async fn example() {
    /// let guard = TierGuard::new();
    /// guard.start_sweeper();
    ///
    /// // Serve traffic...
    ///
    /// guard.shutdown().await;
    /// # }
    /// ```
    #[cfg(feature = "async")]
    pub async fn shutdown(&self) {
        // Take the handle while holding the lock, then release the lock
        // before awaiting.
        let handle = {
            let mut slot = self.sweeper_handle.lock().unwrap();
            slot.take()
        };

        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }
}

impl TierGuard {
    /// Create a builder for configuring the guard.
    ///
    /// Defaults:
    /// - Policy table: production limits (see [`PolicyTable::default`])
    /// - Cache: 1 h base TTL, 1000 entries, 5000 byte compression threshold
    /// - Sweeps: cache every 10 minutes, idle state hourly
    pub fn builder() -> TierGuardBuilder {
        TierGuardBuilder {
            config: GuardConfig::default(),
            clock: None,
        }
    }

    /// Create a guard with default settings.
    ///
    /// # Panics
    /// This method cannot panic because all default values are valid.
    pub fn new() -> Self {
        Self::builder()
            .build()
            .expect("default configuration is always valid")
    }

    /// Create a guard from a deserialized configuration.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn from_config(config: GuardConfig) -> Result<Self, BuildError> {
        Self::builder().with_config(config).build()
    }
}

impl Default for TierGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::clock::MockClock;

    fn guard_with_mock_clock() -> (Arc<MockClock>, TierGuard) {
        let clock = Arc::new(MockClock::new());
        let guard = TierGuard::builder()
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .build()
            .unwrap();
        (clock, guard)
    }

    #[test]
    fn test_default_guard_admits_and_tracks() {
        let guard = TierGuard::new();
        assert_eq!(guard.tracked_identities(), 0);

        let decision = guard.check_limit("tenant-1", Tier::Free, "op", CheckOptions::default());

        assert!(decision.is_allowed());
        assert_eq!(guard.tracked_identities(), 1);
        assert_eq!(guard.metrics().requests_allowed(), 1);
    }

    #[test]
    fn test_policy_override_applies() {
        let mut free = *PolicyTable::default().policy(Tier::Free);
        free.requests_per_minute = 2;
        free.burst_allowance = 0;

        let guard = TierGuard::builder()
            .with_policy(Tier::Free, free)
            .build()
            .unwrap();

        assert!(guard
            .check_limit("t", Tier::Free, "op", CheckOptions::default())
            .is_allowed());
        assert!(guard
            .check_limit("t", Tier::Free, "op", CheckOptions::default())
            .is_allowed());
        assert!(!guard
            .check_limit("t", Tier::Free, "op", CheckOptions::default())
            .is_allowed());
    }

    #[test]
    fn test_full_request_cycle_with_cache() {
        let (_clock, guard) = guard_with_mock_clock();
        let key = CacheKey::simple("copy.generate", "a prompt");

        let decision =
            guard.check_limit("tenant-1", Tier::Starter, "copy.generate", CheckOptions::tokens(500));
        assert!(decision.is_allowed());

        // Miss, compute, store, hit.
        assert_eq!(guard.cache_get::<String>(key), None);
        guard.cache_set(
            key,
            &"generated copy".to_string(),
            SetOptions::new("copy.generate", "model-a", Tier::Starter),
        );
        assert_eq!(
            guard.cache_get::<String>(key),
            Some("generated copy".to_string())
        );

        guard.complete_request("tenant-1");

        let metrics = guard.metrics().snapshot();
        assert_eq!(metrics.requests_allowed, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(
            guard
                .get_status("tenant-1", Tier::Starter)
                .concurrent,
            0
        );
    }

    #[test]
    fn test_builder_rejects_zero_policy_field() {
        let mut starter = *PolicyTable::default().policy(Tier::Starter);
        starter.requests_per_hour = 0;

        let result = TierGuard::builder()
            .with_policy(Tier::Starter, starter)
            .build();

        assert_eq!(
            result.err(),
            Some(BuildError::Policy(PolicyError::ZeroLimit {
                tier: Tier::Starter,
                field: "requests_per_hour",
            }))
        );
    }

    #[test]
    fn test_builder_rejects_zero_max_entries() {
        let result = TierGuard::builder().with_max_entries(0).build();
        assert_eq!(
            result.err(),
            Some(BuildError::Cache(CacheConfigError::ZeroMaxEntries))
        );
    }

    #[test]
    fn test_builder_rejects_zero_sweep_interval() {
        let result = TierGuard::builder()
            .with_sweep_intervals(Duration::ZERO, Duration::from_secs(3600))
            .build();
        assert_eq!(
            result.err(),
            Some(BuildError::Sweep(SweepConfigError::ZeroCacheInterval))
        );
    }

    #[test]
    fn test_sweep_now_reclaims_both_kinds_of_state() {
        let (clock, guard) = guard_with_mock_clock();

        assert!(guard
            .check_limit("idler", Tier::Free, "op", CheckOptions::default())
            .is_allowed());
        guard.complete_request("idler");
        guard.cache_set(
            CacheKey::simple("op", "stale"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Free).with_ttl(Duration::from_secs(60)),
        );

        clock.advance(Duration::from_secs(25 * 3600));

        let report = guard.sweep_now();
        assert_eq!(report.expired_entries, 1);
        assert_eq!(report.idle_identities, 1);
        assert_eq!(guard.tracked_identities(), 0);
        assert!(guard.cache().is_empty());
    }

    #[test]
    fn test_invalidate_through_facade() {
        let (_clock, guard) = guard_with_mock_clock();

        for prompt in ["a", "b", "c"] {
            guard.cache_set(
                CacheKey::simple("copy.generate", prompt),
                &"v",
                SetOptions::new("copy.generate", "model-a", Tier::Agency),
            );
        }
        guard.cache_set(
            CacheKey::simple("copy.rewrite", "d"),
            &"v",
            SetOptions::new("copy.rewrite", "model-a", Tier::Agency),
        );

        let removed = guard.invalidate_matching(|_key, meta| meta.operation == "copy.generate");
        assert_eq!(removed, 3);
        assert_eq!(guard.cache_stats(0).entries, 1);

        assert!(guard.invalidate(CacheKey::simple("copy.rewrite", "d")));
        assert!(guard.cache().is_empty());
    }

    #[test]
    fn test_with_stores_shares_external_state() {
        let accounts_store: Arc<ShardedStore<String, RateLimitState>> =
            Arc::new(ShardedStore::new());
        let cache_store: Arc<ShardedStore<CacheKey, CacheEntry>> = Arc::new(ShardedStore::new());

        let guard = TierGuard::with_stores(
            Arc::clone(&accounts_store),
            Arc::clone(&cache_store),
            Arc::new(SystemClock::new()),
            GuardConfig::default(),
        )
        .unwrap();

        guard.check_limit("tenant-1", Tier::Free, "op", CheckOptions::default());
        guard.cache_set(
            CacheKey::simple("op", "p"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Free),
        );

        assert_eq!(StateStore::len(&accounts_store), 1);
        assert_eq!(StateStore::len(&cache_store), 1);
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let mut config = GuardConfig::default();
        config.cache.max_entries = 250;
        config.sweep.cache_interval = Duration::from_secs(120);

        let json = serde_json::to_string(&config).unwrap();
        let back: GuardConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: GuardConfig =
            serde_json::from_str(r#"{"cache": {"compression_threshold": 1024}}"#).unwrap();

        assert_eq!(config.cache.compression_threshold, 1024);
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.policies, PolicyTable::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_clones_share_state() {
        let guard = TierGuard::new();
        let clone = guard.clone();

        clone.check_limit("tenant-1", Tier::Free, "op", CheckOptions::default());

        assert_eq!(guard.tracked_identities(), 1);
        assert_eq!(guard.metrics().requests_allowed(), 1);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_start_sweeper_is_idempotent_and_shuts_down() {
        let guard = TierGuard::builder()
            .with_sweep_intervals(Duration::from_millis(20), Duration::from_millis(20))
            .build()
            .unwrap();

        guard.start_sweeper();
        guard.start_sweeper(); // no-op, first loop keeps running

        guard.cache_set(
            CacheKey::simple("op", "doomed"),
            &"v",
            SetOptions::new("op", "model-a", Tier::Free).with_ttl(Duration::ZERO),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(guard.cache().is_empty());

        guard.shutdown().await;
        // A second shutdown is a no-op.
        guard.shutdown().await;
    }
}
