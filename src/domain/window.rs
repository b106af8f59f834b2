//! Sliding admission windows.
//!
//! Admission checks count requests over three concurrent sliding windows.
//! The windows are always evaluated tightest-first; the first exhausted
//! window decides the outcome.

use std::fmt;
use std::time::Duration;

use super::tier::TierPolicy;

/// A sliding time window over which request counts are bounded.
///
/// # Example
/// ```
/// use tierguard::RateWindow;
/// use std::time::Duration;
///
/// assert_eq!(RateWindow::Minute.duration(), Duration::from_secs(60));
/// assert_eq!(RateWindow::Day.as_str(), "day");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    /// Evaluation order: tightest window first.
    pub const ALL: [RateWindow; 3] = [RateWindow::Minute, RateWindow::Hour, RateWindow::Day];

    /// Length of the window.
    pub fn duration(&self) -> Duration {
        match self {
            RateWindow::Minute => Duration::from_secs(60),
            RateWindow::Hour => Duration::from_secs(60 * 60),
            RateWindow::Day => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Request limit for this window under the given policy.
    pub fn limit(&self, policy: &TierPolicy) -> u32 {
        match self {
            RateWindow::Minute => policy.requests_per_minute,
            RateWindow::Hour => policy.requests_per_hour,
            RateWindow::Day => policy.requests_per_day,
        }
    }

    /// Lowercase window name, as used in deny codes.
    pub fn as_str(&self) -> &'static str {
        match self {
            RateWindow::Minute => "minute",
            RateWindow::Hour => "hour",
            RateWindow::Day => "day",
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tier::PolicyTable;
    use crate::domain::tier::Tier;

    #[test]
    fn test_windows_evaluate_tightest_first() {
        assert_eq!(
            RateWindow::ALL,
            [RateWindow::Minute, RateWindow::Hour, RateWindow::Day]
        );
        assert!(RateWindow::Minute.duration() < RateWindow::Hour.duration());
        assert!(RateWindow::Hour.duration() < RateWindow::Day.duration());
    }

    #[test]
    fn test_limit_maps_to_policy_fields() {
        let table = PolicyTable::default();
        let policy = table.policy(Tier::Agency);

        assert_eq!(RateWindow::Minute.limit(policy), policy.requests_per_minute);
        assert_eq!(RateWindow::Hour.limit(policy), policy.requests_per_hour);
        assert_eq!(RateWindow::Day.limit(policy), policy.requests_per_day);
    }

    #[test]
    fn test_display_matches_deny_code_stem() {
        assert_eq!(RateWindow::Minute.to_string(), "minute");
        assert_eq!(RateWindow::Hour.to_string(), "hour");
        assert_eq!(RateWindow::Day.to_string(), "day");
    }
}
