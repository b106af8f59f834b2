//! Observability counters for admission control and caching.
//!
//! Provides lifetime counters for monitoring and debugging. Exposing them to
//! a metrics pipeline is the caller's concern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters tracking admission and cache behavior.
///
/// All counters use atomic operations for thread-safe updates and reads.
/// Cloning is cheap and shares the underlying counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Requests admitted, including burst admissions
    requests_allowed: AtomicU64,
    /// Requests denied for any reason
    requests_denied: AtomicU64,
    /// Admissions that consumed a burst unit
    bursts_granted: AtomicU64,
    /// Penalty blocks applied after a window denial
    penalties_applied: AtomicU64,
    /// Cache lookups that returned a live entry
    cache_hits: AtomicU64,
    /// Cache lookups that found nothing usable
    cache_misses: AtomicU64,
    /// Entries removed to make room (does not include expirations)
    cache_evictions: AtomicU64,
    /// Entries removed because their TTL had passed
    cache_expirations: AtomicU64,
    /// Entries stored compressed
    entries_compressed: AtomicU64,
    /// Payloads that failed to encode or decode
    codec_failures: AtomicU64,
}

impl Metrics {
    /// Create a new counter set.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.inner.requests_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_burst(&self) {
        self.inner.bursts_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_penalty(&self) {
        self.inner.penalties_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, count: u64) {
        self.inner.cache_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self, count: u64) {
        self.inner
            .cache_expirations
            .fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_compressed(&self) {
        self.inner.entries_compressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_codec_failure(&self) {
        self.inner.codec_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests admitted.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Total requests denied.
    pub fn requests_denied(&self) -> u64 {
        self.inner.requests_denied.load(Ordering::Relaxed)
    }

    /// Total admissions that consumed a burst unit.
    pub fn bursts_granted(&self) -> u64 {
        self.inner.bursts_granted.load(Ordering::Relaxed)
    }

    /// Total penalty blocks applied.
    pub fn penalties_applied(&self) -> u64 {
        self.inner.penalties_applied.load(Ordering::Relaxed)
    }

    /// Total cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.load(Ordering::Relaxed)
    }

    /// Total cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.load(Ordering::Relaxed)
    }

    /// Total capacity evictions.
    pub fn cache_evictions(&self) -> u64 {
        self.inner.cache_evictions.load(Ordering::Relaxed)
    }

    /// Total expired entries removed.
    pub fn cache_expirations(&self) -> u64 {
        self.inner.cache_expirations.load(Ordering::Relaxed)
    }

    /// Total entries stored compressed.
    pub fn entries_compressed(&self) -> u64 {
        self.inner.entries_compressed.load(Ordering::Relaxed)
    }

    /// Total payload encode/decode failures.
    pub fn codec_failures(&self) -> u64 {
        self.inner.codec_failures.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_denied: self.requests_denied(),
            bursts_granted: self.bursts_granted(),
            penalties_applied: self.penalties_applied(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            cache_evictions: self.cache_evictions(),
            cache_expirations: self.cache_expirations(),
            entries_compressed: self.entries_compressed(),
            codec_failures: self.codec_failures(),
        }
    }

    /// Reset all counters to zero.
    ///
    /// Useful for testing or when starting a new monitoring period.
    pub fn reset(&self) {
        self.inner.requests_allowed.store(0, Ordering::Relaxed);
        self.inner.requests_denied.store(0, Ordering::Relaxed);
        self.inner.bursts_granted.store(0, Ordering::Relaxed);
        self.inner.penalties_applied.store(0, Ordering::Relaxed);
        self.inner.cache_hits.store(0, Ordering::Relaxed);
        self.inner.cache_misses.store(0, Ordering::Relaxed);
        self.inner.cache_evictions.store(0, Ordering::Relaxed);
        self.inner.cache_expirations.store(0, Ordering::Relaxed);
        self.inner.entries_compressed.store(0, Ordering::Relaxed);
        self.inner.codec_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_denied: u64,
    pub bursts_granted: u64,
    pub penalties_applied: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub cache_expirations: u64,
    pub entries_compressed: u64,
    pub codec_failures: u64,
}

impl MetricsSnapshot {
    /// Total admission checks (allowed + denied).
    pub fn total_checks(&self) -> u64 {
        self.requests_allowed.saturating_add(self.requests_denied)
    }

    /// Ratio of denied checks to total checks (0.0 to 1.0).
    ///
    /// Returns 0.0 if no checks have been processed.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            0.0
        } else {
            self.requests_denied as f64 / total as f64
        }
    }

    /// Total cache lookups (hits + misses).
    pub fn total_lookups(&self) -> u64 {
        self.cache_hits.saturating_add(self.cache_misses)
    }

    /// Ratio of hits to total lookups (0.0 to 1.0).
    ///
    /// Returns 0.0 if no lookups have been processed.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
