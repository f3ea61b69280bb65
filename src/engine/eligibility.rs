// src/engine/eligibility.rs

//! Good-behavior scoring and automatic penalty reduction eligibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{engine::scoring::round2, models::penalty::PenaltyProfile};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EligibilityPolicy {
    /// Rule 1: at least this many clean tests...
    pub combined_min_clean: i64,
    /// ...and at least this many days since the last violation.
    pub combined_min_days: i64,

    /// Rule 2: clean tests alone.
    pub min_clean: i64,

    /// Rule 3: elapsed days alone.
    pub min_days: i64,

    /// `can_reduce_by = total / reduction_divisor`, at least `reduction_minimum`.
    pub reduction_divisor: i64,
    pub reduction_minimum: i64,

    /// Clean tests at which the behavior score's streak component saturates.
    pub behavior_clean_saturation: i64,
    /// Days at which the behavior score's time component saturates.
    pub behavior_days_saturation: i64,
    /// Share of the 100-point behavior score given to the clean streak.
    pub behavior_clean_weight: f64,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        EligibilityPolicy {
            combined_min_clean: 5,
            combined_min_days: 30,
            min_clean: 10,
            min_days: 60,
            reduction_divisor: 2,
            reduction_minimum: 1,
            behavior_clean_saturation: 10,
            behavior_days_saturation: 60,
            behavior_clean_weight: 50.0,
        }
    }
}

/// Which threshold made a learner eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityRule {
    CleanStreakAndCooldown,
    CleanStreak,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eligibility {
    pub eligible: bool,
    pub matched_rule: Option<EligibilityRule>,
    pub can_reduce_by: i64,
}

/// Whole days between the last violation and `now`. `None` when there is none.
pub fn days_since(last_violation_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    last_violation_at.map(|at| (now - at).num_days().max(0))
}

/// Bounded 0–100 score, non-decreasing in both the clean streak and elapsed days.
///
/// With no violation on record the time component is saturated.
pub fn good_behavior_score(clean_tests: i64, days: Option<i64>, policy: &EligibilityPolicy) -> f64 {
    let clean_weight = policy.behavior_clean_weight.clamp(0.0, 100.0);
    let days_weight = 100.0 - clean_weight;

    let clean_part = saturating_fraction(clean_tests, policy.behavior_clean_saturation);
    let days_part = match days {
        Some(d) => saturating_fraction(d, policy.behavior_days_saturation),
        None => 1.0,
    };

    round2((clean_weight * clean_part + days_weight * days_part).clamp(0.0, 100.0))
}

fn saturating_fraction(value: i64, saturation: i64) -> f64 {
    if saturation <= 0 {
        return 1.0;
    }
    value.clamp(0, saturation) as f64 / saturation as f64
}

/// Evaluates the three thresholds (OR-ed) against a profile snapshot.
pub fn check(profile: &PenaltyProfile, now: DateTime<Utc>, policy: &EligibilityPolicy) -> Eligibility {
    if profile.total_violations <= 0 {
        return Eligibility {
            eligible: false,
            matched_rule: None,
            can_reduce_by: 0,
        };
    }

    let clean = profile.clean_tests_since_last_violation;
    // A missing timestamp with violations on record counts as long ago.
    let days = days_since(profile.last_violation_at, now).unwrap_or(i64::MAX);

    let matched_rule = if clean >= policy.combined_min_clean && days >= policy.combined_min_days {
        Some(EligibilityRule::CleanStreakAndCooldown)
    } else if clean >= policy.min_clean {
        Some(EligibilityRule::CleanStreak)
    } else if days >= policy.min_days {
        Some(EligibilityRule::Cooldown)
    } else {
        None
    };

    let can_reduce_by = match matched_rule {
        Some(_) => reduction_amount(profile.total_violations, policy),
        None => 0,
    };

    Eligibility {
        eligible: matched_rule.is_some(),
        matched_rule,
        can_reduce_by,
    }
}

fn reduction_amount(total: i64, policy: &EligibilityPolicy) -> i64 {
    let divisor = policy.reduction_divisor.max(1);
    (total / divisor).max(policy.reduction_minimum).min(total)
}

/// Violations left after a manual forgiveness.
pub fn forgiven_total(total: i64, full_forgiveness: bool) -> i64 {
    if full_forgiveness { 0 } else { (total / 2).max(0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn profile(total: i64, clean: i64, days_ago: Option<i64>, now: DateTime<Utc>) -> PenaltyProfile {
        PenaltyProfile {
            learner_id: 7,
            total_violations: total,
            last_violation_at: days_ago.map(|d| now - Duration::days(d)),
            clean_tests_since_last_violation: clean,
            updated_at: now,
        }
    }

    #[test]
    fn test_clean_streak_alone_is_enough() {
        let now = Utc::now();
        let p = profile(4, 10, Some(5), now);
        let result = check(&p, now, &EligibilityPolicy::default());
        assert!(result.eligible);
        assert_eq!(result.matched_rule, Some(EligibilityRule::CleanStreak));
        assert_eq!(result.can_reduce_by, 2);
    }

    #[test]
    fn test_combined_rule() {
        let now = Utc::now();
        let p = profile(3, 5, Some(30), now);
        let result = check(&p, now, &EligibilityPolicy::default());
        assert_eq!(result.matched_rule, Some(EligibilityRule::CleanStreakAndCooldown));
        assert_eq!(result.can_reduce_by, 1);
    }

    #[test]
    fn test_cooldown_alone() {
        let now = Utc::now();
        let p = profile(1, 0, Some(61), now);
        let result = check(&p, now, &EligibilityPolicy::default());
        assert_eq!(result.matched_rule, Some(EligibilityRule::Cooldown));
        // Minimum of one even when half rounds down to zero.
        assert_eq!(result.can_reduce_by, 1);
    }

    #[test]
    fn test_not_eligible_below_all_thresholds() {
        let now = Utc::now();
        let p = profile(6, 4, Some(29), now);
        let result = check(&p, now, &EligibilityPolicy::default());
        assert!(!result.eligible);
        assert_eq!(result.can_reduce_by, 0);
    }

    #[test]
    fn test_nothing_to_reduce() {
        let now = Utc::now();
        let p = profile(0, 20, None, now);
        assert!(!check(&p, now, &EligibilityPolicy::default()).eligible);
    }

    #[test]
    fn test_behavior_score_is_monotonic_and_bounded() {
        let policy = EligibilityPolicy::default();
        let mut previous = -1.0;
        for clean in 0..15 {
            let score = good_behavior_score(clean, Some(10), &policy);
            assert!(score >= previous);
            previous = score;
        }

        let mut previous = -1.0;
        for days in 0..90 {
            let score = good_behavior_score(3, Some(days), &policy);
            assert!(score >= previous);
            previous = score;
        }

        assert_eq!(good_behavior_score(0, Some(0), &policy), 0.0);
        assert_eq!(good_behavior_score(100, Some(1000), &policy), 100.0);
        assert_eq!(good_behavior_score(5, None, &policy), 75.0);
    }

    #[test]
    fn test_forgiven_total() {
        assert_eq!(forgiven_total(7, false), 3);
        assert_eq!(forgiven_total(7, true), 0);
        assert_eq!(forgiven_total(1, false), 0);
        assert_eq!(forgiven_total(0, false), 0);
    }
}
