//! Key-addressed response cache with tier-weighted expiry.
//!
//! Entries expire after a TTL scaled by the owning identity's tier, large
//! payloads are stored gzipped, and capacity is bounded by evicting the
//! least-recently-used fifth of the cache. Lookups are lock-free; writes,
//! evictions, and invalidations serialize on one gate so the size bound is
//! never raced past.
//!
//! Storing is best-effort by contract: a response that cannot be serialized
//! or compressed degrades to "not cached", never into a caller-visible
//! failure.

use crate::application::codec;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, StateStore};
use crate::domain::key::{CacheKey, Fingerprint};
use crate::domain::tier::Tier;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Tunables for the response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Base TTL before tier weighting.
    pub default_ttl: Duration,
    /// Resident entry bound; reaching it triggers eviction.
    pub max_entries: usize,
    /// Serialized payloads strictly larger than this are gzipped.
    pub compression_threshold: usize,
    /// Per-tier TTL multipliers.
    pub tier_multipliers: TierMultipliers,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            default_ttl: Duration::from_secs(3600),
            max_entries: 1000,
            compression_threshold: 5000,
            tier_multipliers: TierMultipliers::default(),
        }
    }
}

impl CacheConfig {
    /// Check config invariants.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.max_entries == 0 {
            return Err(CacheConfigError::ZeroMaxEntries);
        }
        if self.default_ttl.is_zero() {
            return Err(CacheConfigError::ZeroTtl);
        }
        for tier in Tier::ALL {
            let multiplier = self.tier_multipliers.for_tier(tier);
            if !(multiplier > 0.0 && multiplier.is_finite()) {
                return Err(CacheConfigError::InvalidMultiplier { tier });
            }
        }
        Ok(())
    }

    /// Effective TTL for a tier.
    pub fn ttl_for(&self, tier: Tier) -> Duration {
        self.default_ttl.mul_f64(self.tier_multipliers.for_tier(tier))
    }
}

/// Error returned by [`CacheConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheConfigError {
    /// `max_entries` must be positive
    ZeroMaxEntries,
    /// `default_ttl` must be positive
    ZeroTtl,
    /// A tier multiplier must be a positive finite number
    InvalidMultiplier { tier: Tier },
}

impl std::fmt::Display for CacheConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheConfigError::ZeroMaxEntries => write!(f, "max_entries must be positive"),
            CacheConfigError::ZeroTtl => write!(f, "default_ttl must be positive"),
            CacheConfigError::InvalidMultiplier { tier } => {
                write!(f, "ttl multiplier for tier '{}' must be positive and finite", tier)
            }
        }
    }
}

impl std::error::Error for CacheConfigError {}

/// Per-tier TTL multipliers. Higher tiers keep their responses longer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierMultipliers {
    pub free: f64,
    pub starter: f64,
    pub agency: f64,
    pub enterprise: f64,
    pub admin: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        TierMultipliers {
            free: 0.5,
            starter: 1.0,
            agency: 2.0,
            enterprise: 4.0,
            admin: 8.0,
        }
    }
}

impl TierMultipliers {
    /// Multiplier for a tier.
    pub fn for_tier(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Free => self.free,
            Tier::Starter => self.starter,
            Tier::Agency => self.agency,
            Tier::Enterprise => self.enterprise,
            Tier::Admin => self.admin,
        }
    }
}

/// Descriptive metadata attached to a cache entry at set time.
///
/// Carries no payload or prompt material; everything here is safe to expose
/// through stats and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub operation: String,
    pub source_model: String,
    pub prompt_fingerprint: Fingerprint,
    pub token_cost: u64,
    pub owner_tier: Tier,
    pub created_at: Instant,
}

/// One resident cache entry: encoded payload plus access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    payload: Vec<u8>,
    compressed: bool,
    expires_at: Instant,
    access_count: u64,
    last_accessed: Instant,
    meta: EntryMeta,
}

impl CacheEntry {
    fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Entry metadata.
    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    /// Whether the payload is stored gzipped.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Completed lookups against this entry.
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Encoded payload size in bytes.
    pub fn payload_bytes(&self) -> usize {
        self.payload.len()
    }

    /// True once the TTL has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Inputs to a cache store.
#[derive(Debug, Clone)]
pub struct SetOptions {
    pub operation: String,
    pub source_model: String,
    pub prompt_fingerprint: Fingerprint,
    pub token_cost: u64,
    pub owner_tier: Tier,
    /// Bypass tier weighting with an exact TTL.
    pub ttl_override: Option<Duration>,
}

impl SetOptions {
    /// Options for a response produced by `source_model` for `operation` on
    /// behalf of an `owner_tier` identity.
    pub fn new(
        operation: impl Into<String>,
        source_model: impl Into<String>,
        owner_tier: Tier,
    ) -> Self {
        SetOptions {
            operation: operation.into(),
            source_model: source_model.into(),
            prompt_fingerprint: Fingerprint::of(""),
            token_cost: 0,
            owner_tier,
            ttl_override: None,
        }
    }

    /// Attach the fingerprint of the prompt that produced the response.
    pub fn with_prompt_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.prompt_fingerprint = fingerprint;
        self
    }

    /// Attach the token spend of the original request.
    pub fn with_token_cost(mut self, token_cost: u64) -> Self {
        self.token_cost = token_cost;
        self
    }

    /// Pin an exact TTL instead of the tier-weighted default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }
}

/// Metadata-only view of a resident entry, for observability and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub operation: String,
    pub source_model: String,
    pub token_cost: u64,
    pub owner_tier: Tier,
    pub compressed: bool,
    pub payload_bytes: usize,
    pub access_count: u64,
    pub expires_in: Duration,
}

/// One row of [`CacheStats::top_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopEntry {
    pub key: CacheKey,
    pub operation: String,
    pub access_count: u64,
}

/// Point-in-time cache statistics. Redaction-safe: keys and operation names
/// only, never payloads or prompt material.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Resident entries, including expired ones not yet swept.
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Lifetime hits over lookups; 0.0 before the first lookup.
    pub hit_rate: f64,
    /// Approximate payload footprint of resident entries.
    pub payload_bytes: usize,
    pub compressed_entries: usize,
    /// Entries that have served at least one hit.
    pub warm_entries: usize,
    /// Most-accessed entries, descending.
    pub top_entries: Vec<TopEntry>,
    /// Resident entries per owning tier.
    pub tier_distribution: BTreeMap<Tier, usize>,
}

enum Lookup {
    Hit { payload: Vec<u8>, compressed: bool },
    Expired,
}

/// Key-addressed response cache over the StateStore port.
///
/// Cloning shares the underlying storage, gate, and counters.
#[derive(Clone)]
pub struct ResponseCache<S>
where
    S: StateStore<CacheKey, CacheEntry> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    metrics: Metrics,
    write_gate: Arc<Mutex<()>>,
}

impl<S> ResponseCache<S>
where
    S: StateStore<CacheKey, CacheEntry> + Clone,
{
    /// Create a cache over storage with a validated config.
    pub fn new(storage: S, clock: Arc<dyn Clock>, config: CacheConfig, metrics: Metrics) -> Self {
        Self {
            storage,
            clock,
            config,
            metrics,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Look up a cached response.
    ///
    /// Returns a deserialized copy on a live hit and bumps the entry's
    /// access bookkeeping. Expired entries are removed and reported as a
    /// miss; an entry whose payload no longer decodes is dropped and
    /// reported as a miss rather than surfacing an error.
    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let now = self.clock.now();

        let lookup = self.storage.update_entry(&key, |entry| {
            if entry.is_expired(now) {
                Lookup::Expired
            } else {
                entry.touch(now);
                Lookup::Hit {
                    payload: entry.payload.clone(),
                    compressed: entry.compressed,
                }
            }
        });

        match lookup {
            None => {
                self.metrics.record_cache_miss();
                None
            }
            Some(Lookup::Expired) => {
                let _gate = self.lock_writes();
                // Re-check under the gate; a concurrent set may have
                // refreshed the key since the lookup.
                let still_expired = self
                    .storage
                    .read_entry(&key, |entry| entry.is_expired(now))
                    .unwrap_or(false);
                if still_expired {
                    self.storage.remove(&key);
                    self.metrics.record_expiration(1);
                    tracing::debug!(key = %key, "expired cache entry removed on lookup");
                }
                self.metrics.record_cache_miss();
                None
            }
            Some(Lookup::Hit {
                payload,
                compressed,
            }) => {
                let decoded = if compressed {
                    codec::decompress(&payload).and_then(|raw| codec::deserialize(&raw))
                } else {
                    codec::deserialize(&payload)
                };

                match decoded {
                    Ok(value) => {
                        self.metrics.record_cache_hit();
                        Some(value)
                    }
                    Err(error) => {
                        tracing::warn!(key = %key, %error, "dropping undecodable cache entry");
                        self.metrics.record_codec_failure();
                        self.metrics.record_cache_miss();
                        let _gate = self.lock_writes();
                        self.storage.remove(&key);
                        None
                    }
                }
            }
        }
    }

    /// Store a response.
    ///
    /// The TTL is the tier-weighted default unless the options pin one.
    /// Payloads above the compression threshold are gzipped; a payload that
    /// fails to compress is stored raw, and one that fails to serialize is
    /// simply not cached. Neither case fails the call.
    pub fn set<T: Serialize>(&self, key: CacheKey, value: &T, options: SetOptions) {
        let now = self.clock.now();

        let serialized = match codec::serialize(value) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(
                    key = %key,
                    operation = %options.operation,
                    %error,
                    "response not serializable, skipping cache"
                );
                self.metrics.record_codec_failure();
                return;
            }
        };

        let (payload, compressed) = if serialized.len() > self.config.compression_threshold {
            match codec::compress(&serialized) {
                Ok(compressed) => (compressed, true),
                Err(error) => {
                    tracing::warn!(key = %key, %error, "compression failed, storing raw");
                    self.metrics.record_codec_failure();
                    (serialized, false)
                }
            }
        } else {
            (serialized, false)
        };

        if compressed {
            self.metrics.record_compressed();
        }

        let ttl = options
            .ttl_override
            .unwrap_or_else(|| self.config.ttl_for(options.owner_tier));

        let entry = CacheEntry {
            payload,
            compressed,
            expires_at: now + ttl,
            access_count: 0,
            last_accessed: now,
            meta: EntryMeta {
                operation: options.operation,
                source_model: options.source_model,
                prompt_fingerprint: options.prompt_fingerprint,
                token_cost: options.token_cost,
                owner_tier: options.owner_tier,
                created_at: now,
            },
        };

        let _gate = self.lock_writes();
        if self.storage.len() >= self.config.max_entries {
            self.make_room(now);
        }
        self.storage
            .with_entry_mut(key, || entry.clone(), |slot| *slot = entry.clone());
    }

    /// Remove entries whose TTL has passed. Returns the number removed.
    pub fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let _gate = self.lock_writes();
        self.remove_expired_locked(now)
    }

    /// Remove one entry. Returns true if it was resident.
    pub fn invalidate(&self, key: CacheKey) -> bool {
        let _gate = self.lock_writes();
        self.storage.remove(&key).is_some()
    }

    /// Remove every entry matching the predicate. Returns the number
    /// removed.
    ///
    /// The predicate sees the key and the entry metadata, so invalidation
    /// can target an operation, a model, a tier, or a specific prompt
    /// fingerprint.
    pub fn invalidate_matching<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(CacheKey, &EntryMeta) -> bool,
    {
        let _gate = self.lock_writes();
        let mut removed = 0usize;
        self.storage.retain(|key, entry| {
            if predicate(*key, &entry.meta) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            tracing::debug!(removed, "cache entries invalidated");
        }
        removed
    }

    /// Metadata-only view of a resident entry. Does not touch access
    /// bookkeeping and returns expired-but-unswept entries as-is.
    pub fn inspect(&self, key: CacheKey) -> Option<EntrySnapshot> {
        let now = self.clock.now();
        self.storage.read_entry(&key, |entry| EntrySnapshot {
            key,
            operation: entry.meta.operation.clone(),
            source_model: entry.meta.source_model.clone(),
            token_cost: entry.meta.token_cost,
            owner_tier: entry.meta.owner_tier,
            compressed: entry.compressed,
            payload_bytes: entry.payload.len(),
            access_count: entry.access_count,
            expires_in: entry.expires_at.saturating_duration_since(now),
        })
    }

    /// Point-in-time statistics with the `top_n` most-accessed entries.
    pub fn stats(&self, top_n: usize) -> CacheStats {
        let mut payload_bytes = 0usize;
        let mut compressed_entries = 0usize;
        let mut warm_entries = 0usize;
        let mut tier_distribution: BTreeMap<Tier, usize> = BTreeMap::new();
        let mut top: Vec<TopEntry> = Vec::new();

        self.storage.for_each(|key, entry| {
            payload_bytes += entry.payload.len();
            if entry.compressed {
                compressed_entries += 1;
            }
            if entry.access_count > 0 {
                warm_entries += 1;
            }
            *tier_distribution.entry(entry.meta.owner_tier).or_insert(0) += 1;
            top.push(TopEntry {
                key: *key,
                operation: entry.meta.operation.clone(),
                access_count: entry.access_count,
            });
        });

        top.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        top.truncate(top_n);

        let hits = self.metrics.cache_hits();
        let misses = self.metrics.cache_misses();
        let lookups = hits.saturating_add(misses);

        CacheStats {
            entries: self.storage.len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            payload_bytes,
            compressed_entries,
            warm_entries,
            top_entries: top,
            tier_distribution,
        }
    }

    /// Resident entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// True when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let _gate = self.lock_writes();
        self.storage.clear();
    }

    /// The config in force.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reclaim capacity: sweep expired entries first, then evict the
    /// least-recently-used fifth of the configured capacity. Caller holds
    /// the write gate.
    fn make_room(&self, now: Instant) {
        self.remove_expired_locked(now);
        if self.storage.len() < self.config.max_entries {
            return;
        }

        let mut candidates: Vec<(CacheKey, Instant)> = Vec::with_capacity(self.storage.len());
        self.storage
            .for_each(|key, entry| candidates.push((*key, entry.last_accessed)));
        candidates.sort_by_key(|(_, last_accessed)| *last_accessed);

        let target = (self.config.max_entries / 5).max(1);
        let mut evicted = 0u64;
        for (key, _) in candidates.into_iter().take(target) {
            if self.storage.remove(&key).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.metrics.record_eviction(evicted);
            tracing::debug!(evicted, "cache evicted least recently used entries");
        }
    }

    fn remove_expired_locked(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.storage
            .retain(|_key, entry| {
                if entry.is_expired(now) {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        if removed > 0 {
            self.metrics.record_expiration(removed as u64);
            tracing::debug!(removed, "expired cache entries swept");
        }
        removed
    }
}
