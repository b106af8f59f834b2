//! Admission control over per-identity usage state.
//!
//! The controller runs the ordered admission algorithm: penalty block,
//! retention pruning, concurrency, token budget, then the sliding windows
//! tightest-first with burst arbitration. Every check runs inside the
//! identity's per-key critical section, so concurrent checks for one
//! identity serialize and the limits hold exactly.

use crate::application::accounts::AccountRegistry;
use crate::application::metrics::Metrics;
use crate::application::ports::StateStore;
use crate::domain::decision::{AdmissionDecision, DenyReason, RemainingQuota};
use crate::domain::key::Fingerprint;
use crate::domain::tier::Tier;
use crate::domain::usage::{RateLimitState, StatusSnapshot, RETENTION};
use crate::domain::window::RateWindow;
use std::time::Duration;

/// Per-request inputs to an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckOptions {
    /// Estimated token spend of the request, counted against the tier's
    /// daily budget.
    pub token_cost: u64,
    /// Non-zero marks the request urgent, letting low-priority tiers consume
    /// burst allowance they could not otherwise touch.
    pub priority_hint: u32,
}

impl CheckOptions {
    /// Options carrying only a token cost estimate.
    pub fn tokens(token_cost: u64) -> Self {
        CheckOptions {
            token_cost,
            priority_hint: 0,
        }
    }
}

/// Coordinates admission decisions.
///
/// Cloning shares the underlying registry and counters.
#[derive(Clone)]
pub struct AdmissionController<S>
where
    S: StateStore<String, RateLimitState> + Clone,
{
    registry: AccountRegistry<S>,
    metrics: Metrics,
}

impl<S> AdmissionController<S>
where
    S: StateStore<String, RateLimitState> + Clone,
{
    /// Create a new controller over a registry.
    pub fn new(registry: AccountRegistry<S>, metrics: Metrics) -> Self {
        Self { registry, metrics }
    }

    /// Decide whether a request may proceed, and reserve its capacity if so.
    ///
    /// An allowed decision records one usage event and occupies one
    /// concurrency slot; the caller must pair it with
    /// [`complete_request`](Self::complete_request) when the work finishes.
    /// A denied decision reserves nothing.
    ///
    /// Checks are evaluated in fixed order: active penalty block, concurrency
    /// ceiling, token budget, then each window tightest-first. When a window
    /// is exhausted, burst allowance may admit the request anyway if the tier
    /// is privileged (`priority_weight >= 2`) or the request carries a
    /// priority hint; a burst admission skips the remaining window checks. A
    /// window denial applies a penalty block scaled inversely to the tier's
    /// priority weight.
    ///
    /// This method never fails and never panics; denial is a value, not an
    /// error.
    pub fn check_limit(
        &self,
        identity: &str,
        tier: Tier,
        operation: &str,
        options: CheckOptions,
    ) -> AdmissionDecision {
        let decision = self
            .registry
            .with_account(identity, tier, |state, policy, now| {
                // An active block short-circuits everything else. The
                // retry-after shrinks as the block ages; repeat offenses do
                // not extend it.
                if let Some(remaining) = state.remaining_block(now) {
                    return AdmissionDecision::denied(
                        DenyReason::TemporarilyBlocked,
                        Some(remaining),
                        RemainingQuota::default(),
                    );
                }

                state.prune(now);

                if state.concurrent() >= policy.max_concurrent {
                    // Slots free on completion, not by aging; no retry-after.
                    return AdmissionDecision::denied(
                        DenyReason::ConcurrencyLimit,
                        None,
                        RemainingQuota::default(),
                    );
                }

                let spent = state.tokens_within(now);
                if spent.saturating_add(options.token_cost) > policy.daily_token_budget {
                    // Budget frees when the oldest event leaves the 24h
                    // window. No events means the request alone exceeds the
                    // budget and waiting cannot help.
                    let retry = state
                        .oldest_event()
                        .map(|e| (e.at + RETENTION).saturating_duration_since(now));
                    return AdmissionDecision::denied(
                        DenyReason::TokenBudgetExceeded,
                        retry,
                        RemainingQuota::default(),
                    );
                }

                let mut remaining = RemainingQuota::default();
                let mut via_burst = false;

                for window in RateWindow::ALL {
                    let count = state.count_in(window, now);
                    let limit = window.limit(policy);

                    if count >= limit {
                        let burst_left = policy.burst_allowance > state.burst_used_at(now);
                        let burst_eligible =
                            policy.priority_weight >= 2 || options.priority_hint > 0;

                        if burst_left && burst_eligible {
                            state.use_burst();
                            via_burst = true;
                            // Wider windows are not consulted on a burst
                            // grant; their remainders stay zero.
                            break;
                        }

                        let penalty = penalty_for(policy.priority_weight);
                        state.block_until(now + penalty);
                        remaining.set(window, 0);
                        return AdmissionDecision::denied(
                            DenyReason::WindowLimitExceeded(window),
                            Some(window.duration()),
                            remaining,
                        );
                    }

                    remaining.set(window, limit - count - 1);
                }

                state.record(now, options.token_cost);
                state.acquire_slot();

                if via_burst {
                    AdmissionDecision::allowed_via_burst(remaining)
                } else {
                    AdmissionDecision::allowed(remaining)
                }
            });

        if decision.is_allowed() {
            self.metrics.record_allowed();
            if decision.is_burst() {
                self.metrics.record_burst();
            }
        } else {
            self.metrics.record_denied();
            if matches!(decision.reason(), Some(DenyReason::WindowLimitExceeded(_))) {
                self.metrics.record_penalty();
            }
            tracing::debug!(
                identity = %Fingerprint::of(identity),
                tier = %tier,
                operation,
                code = decision.code().unwrap_or(""),
                retry_after_secs = decision.retry_after_secs(),
                "request denied"
            );
        }

        decision
    }

    /// Release the concurrency slot held by an admitted request.
    ///
    /// Idempotent and infallible: completing more often than checking, or
    /// completing an unknown identity, does nothing.
    pub fn complete_request(&self, identity: &str) {
        self.registry
            .update_account(identity, |state, _now| state.release_slot());
    }

    /// Read-only standing of an identity. Never creates state.
    pub fn get_status(&self, identity: &str, tier: Tier) -> StatusSnapshot {
        self.registry.status(identity, tier)
    }

    /// Get a reference to the registry.
    pub fn registry(&self) -> &AccountRegistry<S> {
        &self.registry
    }

    /// Get a reference to the counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Penalty block applied after a window denial.
///
/// One minute scaled by the inverse priority weight, floored at a tenth of
/// a minute: weight 1 waits 60s, weight 2 waits 30s, weight 5 waits 12s.
fn penalty_for(priority_weight: u32) -> Duration {
    let scale = (1.0 / f64::from(priority_weight)).max(0.1);
    Duration::from_secs_f64(60.0 * scale)
}
