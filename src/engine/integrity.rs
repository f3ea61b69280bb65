// src/engine/integrity.rs

//! Termination and penalty rules applied to an attempt's violation count.

use serde::{Deserialize, Serialize};

use crate::engine::scoring::round2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrityPolicy {
    /// Violation count at which an attempt is force-completed.
    pub hard_violation_limit: i64,

    /// Final score of a terminated attempt.
    pub terminated_score: f64,

    pub penalty_step_percent: f64,
    pub max_penalty_percent: f64,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        IntegrityPolicy {
            hard_violation_limit: 3,
            terminated_score: 0.0,
            penalty_step_percent: 10.0,
            max_penalty_percent: 50.0,
        }
    }
}

impl IntegrityPolicy {
    pub fn should_terminate(&self, violation_count: i64) -> bool {
        self.hard_violation_limit > 0 && violation_count >= self.hard_violation_limit
    }

    pub fn remaining_before_termination(&self, violation_count: i64) -> i64 {
        (self.hard_violation_limit - violation_count).max(0)
    }

    /// `min(max_penalty, count * step)`, never negative.
    pub fn penalty_percent(&self, violation_count: i64) -> f64 {
        let raw = violation_count.max(0) as f64 * self.penalty_step_percent;
        raw.min(self.max_penalty_percent).max(0.0)
    }
}

/// Scores frozen onto an attempt when it finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalScore {
    pub final_score: f64,
    pub penalty_percent: f64,
    pub terminated: bool,
}

/// Derives the final score from the raw score and the frozen violation count.
/// Termination overrides the penalty rule.
pub fn final_score(
    raw_score: f64,
    violation_count: i64,
    terminated: bool,
    policy: &IntegrityPolicy,
) -> FinalScore {
    let penalty_percent = policy.penalty_percent(violation_count);

    if terminated {
        return FinalScore {
            final_score: policy.terminated_score,
            penalty_percent,
            terminated: true,
        };
    }

    let penalized = raw_score * (1.0 - penalty_percent / 100.0);

    FinalScore {
        final_score: round2(penalized.max(0.0)),
        penalty_percent,
        terminated: false,
    }
}
