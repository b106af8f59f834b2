//! Subscription tiers and their admission policies.
//!
//! Every identity passing through admission control belongs to exactly one
//! tier. A tier maps to an immutable [`TierPolicy`] describing its window
//! limits, burst allowance, token budget, concurrency ceiling, and priority
//! weight. The full mapping lives in a [`PolicyTable`], which is validated
//! before use so the hot path never has to second-guess its numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tier of an identity.
///
/// Ordering follows privilege: `Free < Starter < Agency < Enterprise < Admin`.
///
/// # Example
/// ```
/// use tierguard::Tier;
///
/// assert!(Tier::Free < Tier::Enterprise);
/// assert_eq!("agency".parse::<Tier>().unwrap(), Tier::Agency);
/// assert_eq!(Tier::Agency.as_str(), "agency");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Agency,
    Enterprise,
    Admin,
}

impl Tier {
    /// All tiers in ascending privilege order.
    pub const ALL: [Tier; 5] = [
        Tier::Free,
        Tier::Starter,
        Tier::Agency,
        Tier::Enterprise,
        Tier::Admin,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Agency => "agency",
            Tier::Enterprise => "enterprise",
            Tier::Admin => "admin",
        }
    }

    /// Parse a tier name, falling back to [`Tier::Free`] for unknown input.
    ///
    /// Identity resolution happens outside this crate, so tier names arriving
    /// here are untrusted strings. An unrecognized name is treated as the most
    /// restrictive tier rather than an error; the fallback is logged once per
    /// occurrence at WARN.
    pub fn from_name_lossy(name: &str) -> Tier {
        match name.parse() {
            Ok(tier) => tier,
            Err(_) => {
                tracing::warn!(tier = name, "unknown tier name, treating as free");
                Tier::Free
            }
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized tier name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tier name: {:?}", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "agency" => Ok(Tier::Agency),
            "enterprise" => Ok(Tier::Enterprise),
            "admin" => Ok(Tier::Admin),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// Immutable per-tier limits consulted on every admission check.
///
/// All capacity fields except `burst_allowance` must be non-zero; see
/// [`PolicyTable::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Requests admitted per sliding minute.
    pub requests_per_minute: u32,
    /// Requests admitted per sliding hour.
    pub requests_per_hour: u32,
    /// Requests admitted per sliding day.
    pub requests_per_day: u32,
    /// Extra admissions available after a window limit is hit, shared across
    /// all windows and replenished every 24 hours.
    pub burst_allowance: u32,
    /// Estimated token spend allowed per trailing 24 hours.
    pub daily_token_budget: u64,
    /// Maximum in-flight requests for one identity.
    pub max_concurrent: u32,
    /// Relative priority. Higher tiers serve shorter penalty blocks and may
    /// consume burst allowance without an explicit priority hint.
    pub priority_weight: u32,
}

/// Validated mapping from every tier to its policy.
///
/// The [`Default`] table is the production configuration; deployments
/// override individual rows through the deserialized config or the facade
/// builder. Always [`validate`](PolicyTable::validate) a hand-built table.
///
/// # Example
/// ```
/// use tierguard::{PolicyTable, Tier};
///
/// let table = PolicyTable::default();
/// table.validate().unwrap();
/// assert_eq!(table.policy(Tier::Free).requests_per_minute, 5);
/// assert!(table.policy(Tier::Admin).priority_weight > table.policy(Tier::Free).priority_weight);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    pub free: TierPolicy,
    pub starter: TierPolicy,
    pub agency: TierPolicy,
    pub enterprise: TierPolicy,
    pub admin: TierPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        PolicyTable {
            free: TierPolicy {
                requests_per_minute: 5,
                requests_per_hour: 60,
                requests_per_day: 200,
                burst_allowance: 3,
                daily_token_budget: 25_000,
                max_concurrent: 2,
                priority_weight: 1,
            },
            starter: TierPolicy {
                requests_per_minute: 15,
                requests_per_hour: 300,
                requests_per_day: 1_500,
                burst_allowance: 5,
                daily_token_budget: 150_000,
                max_concurrent: 5,
                priority_weight: 2,
            },
            agency: TierPolicy {
                requests_per_minute: 60,
                requests_per_hour: 1_500,
                requests_per_day: 10_000,
                burst_allowance: 15,
                daily_token_budget: 750_000,
                max_concurrent: 15,
                priority_weight: 3,
            },
            enterprise: TierPolicy {
                requests_per_minute: 240,
                requests_per_hour: 6_000,
                requests_per_day: 50_000,
                burst_allowance: 40,
                daily_token_budget: 4_000_000,
                max_concurrent: 50,
                priority_weight: 4,
            },
            admin: TierPolicy {
                requests_per_minute: 1_000,
                requests_per_hour: 20_000,
                requests_per_day: 200_000,
                burst_allowance: 100,
                daily_token_budget: 20_000_000,
                max_concurrent: 200,
                priority_weight: 5,
            },
        }
    }
}

impl PolicyTable {
    /// Policy row for a tier.
    pub fn policy(&self, tier: Tier) -> &TierPolicy {
        match tier {
            Tier::Free => &self.free,
            Tier::Starter => &self.starter,
            Tier::Agency => &self.agency,
            Tier::Enterprise => &self.enterprise,
            Tier::Admin => &self.admin,
        }
    }

    /// Mutable policy row for a tier.
    pub fn policy_mut(&mut self, tier: Tier) -> &mut TierPolicy {
        match tier {
            Tier::Free => &mut self.free,
            Tier::Starter => &mut self.starter,
            Tier::Agency => &mut self.agency,
            Tier::Enterprise => &mut self.enterprise,
            Tier::Admin => &mut self.admin,
        }
    }

    /// Replace the policy row for a tier.
    pub fn set(&mut self, tier: Tier, policy: TierPolicy) -> &mut Self {
        *self.policy_mut(tier) = policy;
        self
    }

    /// Check table invariants.
    ///
    /// Rejects zero capacity fields (`burst_allowance` alone may be zero),
    /// window limits that shrink as the window grows, and priority weights
    /// that do not strictly increase with tier rank.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for tier in Tier::ALL {
            let p = self.policy(tier);
            for (field, value) in [
                ("requests_per_minute", u64::from(p.requests_per_minute)),
                ("requests_per_hour", u64::from(p.requests_per_hour)),
                ("requests_per_day", u64::from(p.requests_per_day)),
                ("daily_token_budget", p.daily_token_budget),
                ("max_concurrent", u64::from(p.max_concurrent)),
                ("priority_weight", u64::from(p.priority_weight)),
            ] {
                if value == 0 {
                    return Err(PolicyError::ZeroLimit { tier, field });
                }
            }
            if p.requests_per_minute > p.requests_per_hour
                || p.requests_per_hour > p.requests_per_day
            {
                return Err(PolicyError::InconsistentWindows { tier });
            }
        }

        for pair in Tier::ALL.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if self.policy(lower).priority_weight >= self.policy(upper).priority_weight {
                return Err(PolicyError::NonMonotonicWeight { lower, upper });
            }
        }

        Ok(())
    }
}

/// Error returned by [`PolicyTable::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    /// A capacity field that must be positive is zero.
    ZeroLimit { tier: Tier, field: &'static str },
    /// Window limits shrink as the window grows (e.g. more requests allowed
    /// per minute than per hour).
    InconsistentWindows { tier: Tier },
    /// Priority weights must strictly increase with tier rank.
    NonMonotonicWeight { lower: Tier, upper: Tier },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::ZeroLimit { tier, field } => {
                write!(f, "policy for tier '{}' has zero {}", tier, field)
            }
            PolicyError::InconsistentWindows { tier } => {
                write!(
                    f,
                    "policy for tier '{}' allows more requests in a shorter window than in a longer one",
                    tier
                )
            }
            PolicyError::NonMonotonicWeight { lower, upper } => {
                write!(
                    f,
                    "priority weight of tier '{}' must be lower than tier '{}'",
                    lower, upper
                )
            }
        }
    }
}

impl std::error::Error for PolicyError {}
