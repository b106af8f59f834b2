//! Admission decisions returned to callers.
//!
//! A decision is data, not an error: denial is an expected outcome of a
//! healthy system. Every denial carries a stable machine-readable code and,
//! where waiting can help, a retry-after duration.

use std::fmt;
use std::time::Duration;

use super::window::RateWindow;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The identity is serving a penalty block from an earlier violation.
    TemporarilyBlocked,
    /// All concurrency slots are occupied.
    ConcurrencyLimit,
    /// The trailing 24 h token budget cannot absorb the request.
    TokenBudgetExceeded,
    /// A sliding window is at its limit and no burst was available.
    WindowLimitExceeded(RateWindow),
}

impl DenyReason {
    /// Stable machine-readable code, suitable for response bodies and logs.
    ///
    /// # Example
    /// ```
    /// use tierguard::{DenyReason, RateWindow};
    ///
    /// assert_eq!(
    ///     DenyReason::WindowLimitExceeded(RateWindow::Minute).code(),
    ///     "minute_limit_exceeded"
    /// );
    /// assert_eq!(DenyReason::ConcurrencyLimit.code(), "concurrency_limit");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::TemporarilyBlocked => "temporarily_blocked",
            DenyReason::ConcurrencyLimit => "concurrency_limit",
            DenyReason::TokenBudgetExceeded => "token_budget_exceeded",
            DenyReason::WindowLimitExceeded(RateWindow::Minute) => "minute_limit_exceeded",
            DenyReason::WindowLimitExceeded(RateWindow::Hour) => "hour_limit_exceeded",
            DenyReason::WindowLimitExceeded(RateWindow::Day) => "day_limit_exceeded",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Admissions left per window after a decision.
///
/// On a denial the denying window reads zero and wider windows that were
/// never evaluated keep their computed remainder, so callers always see a
/// consistent "0 left" for the limit that stopped them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemainingQuota {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

impl RemainingQuota {
    /// Remaining admissions in one window.
    pub fn get(&self, window: RateWindow) -> u32 {
        match window {
            RateWindow::Minute => self.minute,
            RateWindow::Hour => self.hour,
            RateWindow::Day => self.day,
        }
    }

    pub(crate) fn set(&mut self, window: RateWindow, value: u32) {
        match window {
            RateWindow::Minute => self.minute = value,
            RateWindow::Hour => self.hour = value,
            RateWindow::Day => self.day = value,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    allowed: bool,
    via_burst: bool,
    reason: Option<DenyReason>,
    retry_after: Option<Duration>,
    remaining: RemainingQuota,
}

impl AdmissionDecision {
    /// An ordinary admission.
    pub(crate) fn allowed(remaining: RemainingQuota) -> Self {
        AdmissionDecision {
            allowed: true,
            via_burst: false,
            reason: None,
            retry_after: None,
            remaining,
        }
    }

    /// An admission granted by consuming a burst unit.
    pub(crate) fn allowed_via_burst(remaining: RemainingQuota) -> Self {
        AdmissionDecision {
            allowed: true,
            via_burst: true,
            reason: None,
            retry_after: None,
            remaining,
        }
    }

    /// A denial.
    pub(crate) fn denied(
        reason: DenyReason,
        retry_after: Option<Duration>,
        remaining: RemainingQuota,
    ) -> Self {
        AdmissionDecision {
            allowed: false,
            via_burst: false,
            reason: Some(reason),
            retry_after,
            remaining,
        }
    }

    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Whether the admission consumed a burst unit.
    pub fn is_burst(&self) -> bool {
        self.via_burst
    }

    /// Denial reason; `None` when allowed.
    pub fn reason(&self) -> Option<DenyReason> {
        self.reason
    }

    /// Denial code; `None` when allowed.
    pub fn code(&self) -> Option<&'static str> {
        self.reason.map(|r| r.code())
    }

    /// How long to wait before retrying, when waiting can help.
    ///
    /// `None` on allowed decisions, and on denials where time alone frees no
    /// capacity (e.g. occupied concurrency slots).
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Retry-after in whole seconds, rounded up. Convenient for
    /// `Retry-After` response headers.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| {
            let secs = d.as_secs();
            if d.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// Admissions left per window after this decision.
    pub fn remaining(&self) -> RemainingQuota {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_codes_are_stable() {
        assert_eq!(DenyReason::TemporarilyBlocked.code(), "temporarily_blocked");
        assert_eq!(DenyReason::ConcurrencyLimit.code(), "concurrency_limit");
        assert_eq!(
            DenyReason::TokenBudgetExceeded.code(),
            "token_budget_exceeded"
        );
        assert_eq!(
            DenyReason::WindowLimitExceeded(RateWindow::Minute).code(),
            "minute_limit_exceeded"
        );
        assert_eq!(
            DenyReason::WindowLimitExceeded(RateWindow::Hour).code(),
            "hour_limit_exceeded"
        );
        assert_eq!(
            DenyReason::WindowLimitExceeded(RateWindow::Day).code(),
            "day_limit_exceeded"
        );
    }

    #[test]
    fn test_display_matches_code() {
        let reason = DenyReason::WindowLimitExceeded(RateWindow::Day);
        assert_eq!(reason.to_string(), reason.code());
    }

    #[test]
    fn test_allowed_decision_carries_no_reason() {
        let decision = AdmissionDecision::allowed(RemainingQuota {
            minute: 4,
            hour: 59,
            day: 199,
        });

        assert!(decision.is_allowed());
        assert!(!decision.is_burst());
        assert_eq!(decision.reason(), None);
        assert_eq!(decision.code(), None);
        assert_eq!(decision.retry_after(), None);
        assert_eq!(decision.remaining().minute, 4);
    }

    #[test]
    fn test_burst_admission_is_flagged() {
        let decision = AdmissionDecision::allowed_via_burst(RemainingQuota::default());
        assert!(decision.is_allowed());
        assert!(decision.is_burst());
    }

    #[test]
    fn test_denied_decision_carries_reason_and_retry() {
        let decision = AdmissionDecision::denied(
            DenyReason::WindowLimitExceeded(RateWindow::Minute),
            Some(Duration::from_secs(60)),
            RemainingQuota::default(),
        );

        assert!(!decision.is_allowed());
        assert_eq!(decision.code(), Some("minute_limit_exceeded"));
        assert_eq!(decision.retry_after_secs(), Some(60));
        assert_eq!(decision.remaining().minute, 0);
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        let decision = AdmissionDecision::denied(
            DenyReason::TemporarilyBlocked,
            Some(Duration::from_millis(1_500)),
            RemainingQuota::default(),
        );
        assert_eq!(decision.retry_after_secs(), Some(2));

        let none = AdmissionDecision::denied(
            DenyReason::ConcurrencyLimit,
            None,
            RemainingQuota::default(),
        );
        assert_eq!(none.retry_after_secs(), None);
    }

    #[test]
    fn test_remaining_quota_accessors() {
        let mut quota = RemainingQuota::default();
        quota.set(RateWindow::Hour, 42);

        assert_eq!(quota.get(RateWindow::Hour), 42);
        assert_eq!(quota.get(RateWindow::Minute), 0);
        assert_eq!(quota.hour, 42);
    }
}
