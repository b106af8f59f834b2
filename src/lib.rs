//! # tierguard
//!
//! Tier-aware admission control and response caching for expensive request
//! paths.
//!
//! This crate decides, per identity, whether a request may proceed right now
//! (sliding windows, burst allowance, penalty blocks, token budget, and a
//! concurrency cap, all derived from the identity's subscription tier) and
//! pairs that with a response cache whose TTL scales with the owning tier.
//! It is built for the request path in front of costly work: model calls,
//! renders, heavy queries.
//!
//! ## Quick Start
//!
//! ```rust
//! use tierguard::{CacheKey, CheckOptions, SetOptions, Tier, TierGuard};
//!
//! // Production defaults: per-tier limits, 1 h base TTL, periodic sweeps.
//! let guard = TierGuard::new();
//!
//! // 1. Admission: does this identity get to run the expensive operation?
//! let decision =
//!     guard.check_limit("tenant-42", Tier::Starter, "copy.generate", CheckOptions::tokens(800));
//! assert!(decision.is_allowed());
//!
//! // 2. Cache: serve a previous answer when one exists.
//! let key = CacheKey::simple("copy.generate", "three taglines for a bakery");
//! let cached: Option<String> = guard.cache_get(key);
//! if cached.is_none() {
//!     let response = "fresh. local. yours.".to_string(); // the expensive part
//!     guard.cache_set(
//!         key,
//!         &response,
//!         SetOptions::new("copy.generate", "model-a", Tier::Starter).with_token_cost(800),
//!     );
//! }
//!
//! // 3. Completion: release the concurrency slot.
//! guard.complete_request("tenant-42");
//! ```
//!
//! Or customize:
//!
//! ```rust
//! use std::time::Duration;
//! use tierguard::{PolicyTable, Tier, TierGuard};
//!
//! let mut agency = *PolicyTable::default().policy(Tier::Agency);
//! agency.max_concurrent = 30;
//!
//! let guard = TierGuard::builder()
//!     .with_policy(Tier::Agency, agency)
//!     .with_default_ttl(Duration::from_secs(1800))
//!     .with_max_entries(5_000)
//!     .build()
//!     .unwrap();
//! # let _ = guard;
//! ```
//!
//! ## Features
//!
//! ### Admission Control
//! - **Sliding windows**: per-minute, per-hour, and per-day request limits
//!   counted over a trailing event log, never calendar buckets
//! - **Burst allowance**: a daily pool of extra admissions past a window
//!   limit, spent by privileged tiers or explicitly prioritized requests
//! - **Penalty blocks**: a window denial blocks the identity briefly, scaled
//!   down by tier priority, so hammering clients back off
//! - **Token budget**: estimated token spend capped per trailing 24 h
//! - **Concurrency cap**: admitted requests hold a slot until completed
//!
//! ### Response Cache
//! - **Tier-weighted TTL**: one base TTL, scaled per owning tier (a free
//!   identity's entries expire at half the base, admin entries last 8x)
//! - **Transparent compression**: payloads above a size threshold are
//!   gzipped on store and inflated on lookup
//! - **Bounded size**: at capacity, expired entries are reclaimed first,
//!   then the least-recently-used fifth is evicted
//! - **Targeted invalidation**: by key, or by predicate over entry metadata
//!
//! ### Other
//! - **Observability metrics**: built-in counters across both subsystems
//! - **Background sweeping**: a supervised reclamation task with graceful
//!   shutdown (`async` feature, enabled by default)
//! - **Pluggable state**: storage and clock sit behind ports, so tests run
//!   on a mock clock and a shared backend can replace the in-process map
//!
//! ## How Admission Decides
//!
//! [`TierGuard::check_limit`] evaluates one identity's state in a fixed
//! order, inside a single per-identity critical section:
//!
//! 1. **Active penalty block** - denied outright until it lapses; repeat
//!    checks never extend the block
//! 2. **Concurrency cap** - denied with no retry hint, because a slot frees
//!    whenever some in-flight request completes, which is not schedulable
//! 3. **Token budget** - denied with a retry hint at the moment the oldest
//!    spend drops out of the trailing day
//! 4. **Windows, tightest first** - minute, then hour, then day; the first
//!    exhausted window denies unless burst applies. Burst is spent by
//!    privileged tiers (priority weight >= 2) or an explicit priority hint,
//!    and admits immediately without evaluating wider windows
//!
//! A window denial also applies the penalty block: 60 seconds divided by the
//! tier's priority weight, never below 6 s.
//!
//! ```rust
//! use tierguard::{CheckOptions, PolicyTable, Tier, TierGuard};
//!
//! // One request per minute and no burst, to show a denial.
//! let mut free = *PolicyTable::default().policy(Tier::Free);
//! free.requests_per_minute = 1;
//! free.burst_allowance = 0;
//! let guard = TierGuard::builder().with_policy(Tier::Free, free).build().unwrap();
//!
//! assert!(guard.check_limit("t", Tier::Free, "op", CheckOptions::default()).is_allowed());
//!
//! let denied = guard.check_limit("t", Tier::Free, "op", CheckOptions::default());
//! assert!(!denied.is_allowed());
//! assert_eq!(denied.code(), Some("minute_limit_exceeded"));
//! assert_eq!(denied.retry_after_secs(), Some(60));
//! ```
//!
//! Denials are ordinary values, not errors: a decision carries the reason, a
//! machine-readable code for response headers, a retry hint, and the
//! remaining quota per window.
//!
//! ## Cache Keys and Redaction
//!
//! Cache keys are 64-bit hashes over the operation name, the prompt text,
//! and a structured parameter map. The raw prompt never leaves the caller:
//! logs, stats, and stored metadata only ever see key hashes and
//! [`Fingerprint`]s.
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use tierguard::{CacheKey, Fingerprint};
//!
//! let mut params = BTreeMap::new();
//! params.insert("temperature".to_string(), serde_json::json!(0.7));
//! params.insert("lang".to_string(), serde_json::json!("en"));
//!
//! let key = CacheKey::compute("copy.generate", "a prompt", &params);
//! assert_eq!(key, CacheKey::compute("copy.generate", "a prompt", &params));
//!
//! // Log-safe stand-in for the prompt itself.
//! let fp = Fingerprint::of("a prompt");
//! assert_eq!(format!("{fp}").len(), 16);
//! ```
//!
//! ## Observability
//!
//! ```rust
//! use tierguard::{CheckOptions, Tier, TierGuard};
//!
//! let guard = TierGuard::new();
//! guard.check_limit("tenant-1", Tier::Free, "op", CheckOptions::default());
//!
//! let metrics = guard.metrics();
//! assert_eq!(metrics.requests_allowed(), 1);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.denial_rate(), 0.0);
//!
//! // Per-identity view, read-only (never creates state):
//! let status = guard.get_status("tenant-1", Tier::Free);
//! assert_eq!(status.windows[0].used, 1);
//! ```
//!
//! Cache-side statistics stay redaction-safe and are cheap enough for a
//! health endpoint: entry count, hit rate, payload footprint, per-tier
//! distribution, and the most-accessed entries by operation name.
//!
//! ## Background Sweeping
//!
//! Expired cache entries and identities idle past 24 h are reclaimed by a
//! supervised task (requires the `async` feature and a tokio runtime):
//!
//! ```rust,no_run
//! # use tierguard::TierGuard;
//! # async fn example() {
//! let guard = TierGuard::new();
//! guard.start_sweeper();
//!
//! // ... serve traffic ...
//!
//! guard.shutdown().await; // stops the loop cleanly
//! # }
//! ```
//!
//! Without a runtime, [`TierGuard::sweep_now`] runs both passes
//! synchronously. Lookups also drop expired entries they encounter, so
//! correctness never depends on the sweeper.
//!
//! ## Configuration
//!
//! Every knob deserializes from application config, with production defaults
//! filling anything omitted:
//!
//! ```rust
//! use tierguard::{GuardConfig, TierGuard};
//!
//! let config: GuardConfig = serde_json::from_str(
//!     r#"{"cache": {"max_entries": 5000, "compression_threshold": 2048}}"#,
//! ).unwrap();
//! let guard = TierGuard::from_config(config).unwrap();
//! # let _ = guard;
//! ```
//!
//! ## Memory Management
//!
//! Both stores are bounded. Admission state is capped by the policy table
//! itself: an identity's event log never exceeds its per-day limit, and
//! identities idle past 24 h are swept. Cache residency is capped by
//! `max_entries`.
//!
//! ```text
//! Per-identity admission state:
//! |- identity key (String)         ~24-64 bytes
//! |- event log (VecDeque)          24 bytes x events in trailing 24 h
//! |- burst / block / concurrency   ~64 bytes
//! `- map overhead (DashMap)        ~40 bytes
//! ```
//!
//! **Typical footprint at the default policy table:**
//!
//! | Population | Admission state | Dominated by |
//! |------------|-----------------|--------------|
//! | 1,000 free-tier identities at quota | ~5 MB | 200 events/day each |
//! | 1,000 mixed identities, light use | ~1 MB | keys and map overhead |
//! | 100 enterprise identities at quota | ~130 MB | 50k events/day each |
//!
//! Cache memory is payload-dominated: `max_entries` x typical serialized
//! payload, compressed above the threshold. Watch both sides:
//!
//! ```rust
//! # use tierguard::TierGuard;
//! # let guard = TierGuard::new();
//! let identities = guard.tracked_identities();
//! let stats = guard.cache_stats(10);
//!
//! if stats.payload_bytes > 64 * 1024 * 1024 {
//!     tracing::warn!(bytes = stats.payload_bytes, "cache payload footprint is high");
//! }
//! # let _ = identities;
//! ```
//!
//! ## Feature Flags
//!
//! - `async` *(default)* - the background sweeper task (tokio)
//! - `test-helpers` - exposes `infrastructure::mocks::MockClock` for
//!   deterministic integration tests

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    decision::{AdmissionDecision, DenyReason, RemainingQuota},
    key::{CacheKey, Fingerprint},
    tier::{PolicyError, PolicyTable, Tier, TierPolicy, UnknownTier},
    usage::{RateLimitState, StatusSnapshot, UsageEvent, WindowStatus, RETENTION},
    window::RateWindow,
};

pub use application::{
    accounts::AccountRegistry,
    cache::{
        CacheConfig, CacheConfigError, CacheEntry, CacheStats, EntryMeta, EntrySnapshot,
        ResponseCache, SetOptions, TierMultipliers, TopEntry,
    },
    codec::CodecError,
    controller::{AdmissionController, CheckOptions},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, StateStore},
    sweeper::{SweepConfig, SweepConfigError, SweepReport, Sweeper},
};

#[cfg(feature = "async")]
pub use application::sweeper::SweeperHandle;

pub use infrastructure::{
    clock::SystemClock,
    guard::{BuildError, GuardConfig, TierGuard, TierGuardBuilder},
    store::ShardedStore,
};
