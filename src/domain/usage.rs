//! Per-identity usage state tracked by admission control.
//!
//! One [`RateLimitState`] exists per active identity. It is created lazily on
//! first contact, pruned to the trailing 24 hours on every touch, and removed
//! by the idle sweeper once the identity has been quiet for a full retention
//! period. Memory therefore stays proportional to daily traffic, not total
//! traffic.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::tier::TierPolicy;
use super::window::RateWindow;

/// Retention horizon for usage events. Doubles as the burst replenishment
/// period, the token budget window, and the idle-state lifetime.
pub const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// A single admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEvent {
    /// Admission time.
    pub at: Instant,
    /// Estimated token spend attributed to the request.
    pub token_cost: u64,
}

/// Mutable admission state of one identity.
///
/// Events are kept in admission order, so pruning pops from the front and
/// window counting scans from the back.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    events: VecDeque<UsageEvent>,
    burst_used: u32,
    burst_reset_at: Instant,
    concurrent: u32,
    blocked_until: Option<Instant>,
    last_seen: Instant,
}

impl RateLimitState {
    /// Fresh state for an identity first seen at `now`.
    pub fn new(now: Instant) -> Self {
        RateLimitState {
            events: VecDeque::new(),
            burst_used: 0,
            burst_reset_at: now,
            concurrent: 0,
            blocked_until: None,
            last_seen: now,
        }
    }

    /// Record that the identity was touched, for idle detection.
    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Drop events older than [`RETENTION`] and replenish the burst
    /// allowance once per retention period.
    pub fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest.at) > RETENTION {
                self.events.pop_front();
            } else {
                break;
            }
        }

        if now.saturating_duration_since(self.burst_reset_at) >= RETENTION {
            self.burst_used = 0;
            self.burst_reset_at = now;
        }
    }

    /// Record an admitted request.
    pub fn record(&mut self, now: Instant, token_cost: u64) {
        self.events.push_back(UsageEvent {
            at: now,
            token_cost,
        });
        self.last_seen = now;
    }

    /// Number of retained events (the trailing 24 hours after a prune).
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are retained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Requests admitted within the given window.
    pub fn count_in(&self, window: RateWindow, now: Instant) -> u32 {
        let span = window.duration();
        self.events
            .iter()
            .rev()
            .take_while(|e| now.saturating_duration_since(e.at) <= span)
            .count() as u32
    }

    /// Token spend within the trailing retention period.
    pub fn tokens_within(&self, now: Instant) -> u64 {
        self.events
            .iter()
            .filter(|e| now.saturating_duration_since(e.at) <= RETENTION)
            .map(|e| e.token_cost)
            .sum()
    }

    /// Oldest retained event, if any.
    pub fn oldest_event(&self) -> Option<UsageEvent> {
        self.events.front().copied()
    }

    /// Time until the oldest in-window event ages out; zero when the window
    /// holds no events.
    pub fn resets_in(&self, window: RateWindow, now: Instant) -> Duration {
        let span = window.duration();
        self.events
            .iter()
            .find(|e| now.saturating_duration_since(e.at) <= span)
            .map(|e| span.saturating_sub(now.saturating_duration_since(e.at)))
            .unwrap_or(Duration::ZERO)
    }

    /// Burst units consumed in the current replenishment period.
    ///
    /// Unlike the raw counter this accounts for a replenishment that is due
    /// but not yet applied, so read-only status projections stay accurate.
    pub fn burst_used_at(&self, now: Instant) -> u32 {
        if now.saturating_duration_since(self.burst_reset_at) >= RETENTION {
            0
        } else {
            self.burst_used
        }
    }

    /// Consume one burst unit. Callers check availability first.
    pub fn use_burst(&mut self) {
        self.burst_used += 1;
    }

    /// In-flight requests.
    pub fn concurrent(&self) -> u32 {
        self.concurrent
    }

    /// Occupy a concurrency slot.
    pub fn acquire_slot(&mut self) {
        self.concurrent += 1;
    }

    /// Release a concurrency slot. Saturating: releasing more often than
    /// acquiring never underflows, so completion callbacks stay idempotent.
    pub fn release_slot(&mut self) {
        self.concurrent = self.concurrent.saturating_sub(1);
    }

    /// Start or extend a penalty block.
    pub fn block_until(&mut self, until: Instant) {
        self.blocked_until = Some(until);
    }

    /// Remaining penalty block, if one is active.
    pub fn remaining_block(&self, now: Instant) -> Option<Duration> {
        match self.blocked_until {
            Some(until) if until > now => Some(until.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// True once the identity has gone a full retention period without any
    /// contact. Idle states may still hold concurrency slots (a completion
    /// callback leak); the sweeper reports those before removal.
    pub fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= RETENTION
    }

    /// Read-only projection of this state under the given policy.
    pub fn status(&self, policy: &TierPolicy, now: Instant) -> StatusSnapshot {
        let window_status = |window: RateWindow| WindowStatus {
            window,
            used: self.count_in(window, now),
            limit: window.limit(policy),
            resets_in: self.resets_in(window, now),
        };

        StatusSnapshot {
            windows: [
                window_status(RateWindow::Minute),
                window_status(RateWindow::Hour),
                window_status(RateWindow::Day),
            ],
            tokens_used: self.tokens_within(now),
            token_budget: policy.daily_token_budget,
            burst_used: self.burst_used_at(now),
            burst_allowance: policy.burst_allowance,
            concurrent: self.concurrent,
            max_concurrent: policy.max_concurrent,
            blocked_for: self.remaining_block(now),
        }
    }
}

/// Standing of one identity within a single window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    pub window: RateWindow,
    pub used: u32,
    pub limit: u32,
    /// Time until the oldest in-window event ages out; zero when the window
    /// is empty.
    pub resets_in: Duration,
}

/// Read-only projection of an identity's current standing.
///
/// Identities with no tracked state project as all-zero usage against their
/// tier's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Per-window usage, tightest window first.
    pub windows: [WindowStatus; 3],
    pub tokens_used: u64,
    pub token_budget: u64,
    pub burst_used: u32,
    pub burst_allowance: u32,
    pub concurrent: u32,
    pub max_concurrent: u32,
    /// Remaining penalty block, if one is active.
    pub blocked_for: Option<Duration>,
}

impl StatusSnapshot {
    /// Zeroed snapshot for an identity with no tracked state.
    pub fn idle(policy: &TierPolicy) -> Self {
        let window_status = |window: RateWindow| WindowStatus {
            window,
            used: 0,
            limit: window.limit(policy),
            resets_in: Duration::ZERO,
        };

        StatusSnapshot {
            windows: [
                window_status(RateWindow::Minute),
                window_status(RateWindow::Hour),
                window_status(RateWindow::Day),
            ],
            tokens_used: 0,
            token_budget: policy.daily_token_budget,
            burst_used: 0,
            burst_allowance: policy.burst_allowance,
            concurrent: 0,
            max_concurrent: policy.max_concurrent,
            blocked_for: None,
        }
    }

    /// Standing within one window.
    pub fn window(&self, window: RateWindow) -> WindowStatus {
        self.windows[match window {
            RateWindow::Minute => 0,
            RateWindow::Hour => 1,
            RateWindow::Day => 2,
        }]
    }
}
