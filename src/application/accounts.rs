//! Registry of per-identity admission state.
//!
//! The registry owns the mapping from identity to [`RateLimitState`] and the
//! policy table. State is created lazily on first contact and removed again
//! by the idle sweep once an identity has been quiet for a full retention
//! period.

use crate::application::ports::{Clock, StateStore};
use crate::domain::key::Fingerprint;
use crate::domain::tier::{PolicyTable, Tier, TierPolicy};
use crate::domain::usage::{RateLimitState, StatusSnapshot};
use std::sync::Arc;
use std::time::Instant;

/// Registry managing admission state for all active identities.
///
/// Uses the StateStore port for concurrent access. Generic over the storage
/// implementation; in production this is `Arc<ShardedStore>`.
#[derive(Clone)]
pub struct AccountRegistry<S>
where
    S: StateStore<String, RateLimitState> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    policies: PolicyTable,
}

impl<S> AccountRegistry<S>
where
    S: StateStore<String, RateLimitState> + Clone,
{
    /// Create a new registry with storage, clock, and a validated policy
    /// table.
    pub fn new(storage: S, clock: Arc<dyn Clock>, policies: PolicyTable) -> Self {
        Self {
            storage,
            clock,
            policies,
        }
    }

    /// Access or create the state of one identity within its per-key
    /// critical section.
    ///
    /// First contact creates fresh state. The callback receives the state,
    /// the identity's tier policy, and the current timestamp; the entry
    /// guard is held for its duration, so check-then-act sequences inside it
    /// are race-free.
    pub fn with_account<F, R>(&self, identity: &str, tier: Tier, f: F) -> R
    where
        F: FnOnce(&mut RateLimitState, &TierPolicy, Instant) -> R,
    {
        let now = self.clock.now();
        let policy = self.policies.policy(tier);
        self.storage.with_entry_mut(
            identity.to_string(),
            || RateLimitState::new(now),
            |state| {
                state.touch(now);
                f(state, policy, now)
            },
        )
    }

    /// Access the state of one identity only if it already exists.
    ///
    /// Returns `None` for unknown identities without creating state.
    pub fn update_account<F, R>(&self, identity: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut RateLimitState, Instant) -> R,
    {
        let now = self.clock.now();
        self.storage.update_entry(&identity.to_string(), |state| {
            state.touch(now);
            f(state, now)
        })
    }

    /// Read-only standing of an identity under its tier policy.
    ///
    /// Reads do not count as contact: polling status keeps no state alive.
    /// Unknown identities project as zero usage.
    pub fn status(&self, identity: &str, tier: Tier) -> StatusSnapshot {
        let now = self.clock.now();
        let policy = self.policies.policy(tier);
        self.storage
            .read_entry(&identity.to_string(), |state| state.status(policy, now))
            .unwrap_or_else(|| StatusSnapshot::idle(policy))
    }

    /// The policy table in force.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Policy row for a tier.
    pub fn policy(&self, tier: Tier) -> &TierPolicy {
        self.policies.policy(tier)
    }

    /// Current timestamp from the injected clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Number of identities with tracked state.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if no identities are tracked.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop all tracked state.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Remove identities that have been quiet for a full retention period.
    ///
    /// Returns the number of states removed. A removed state that still
    /// holds a concurrency slot points at a missed completion callback and
    /// is reported at WARN, identified only by fingerprint.
    pub fn remove_idle(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0usize;

        self.storage.retain(|identity, state| {
            state.prune(now);
            if !state.is_idle(now) {
                return true;
            }
            if state.concurrent() > 0 {
                tracing::warn!(
                    identity = %Fingerprint::of(identity),
                    slots = state.concurrent(),
                    "removing idle identity that still holds concurrency slots"
                );
            }
            removed += 1;
            false
        });

        if removed > 0 {
            tracing::debug!(removed, "idle identity sweep finished");
        }
        removed
    }
}
