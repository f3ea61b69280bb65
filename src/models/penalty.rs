// src/models/penalty.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{engine::eligibility::EligibilityRule, error::AppError};

/// Represents the 'penalty_profiles' table.
/// Per-learner history that outlives any single attempt.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PenaltyProfile {
    pub learner_id: i64,
    pub total_violations: i64,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub clean_tests_since_last_violation: i64,
    pub updated_at: DateTime<Utc>,
}

impl PenaltyProfile {
    /// Profile of a learner with no recorded history.
    pub fn empty(learner_id: i64, now: DateTime<Utc>) -> Self {
        PenaltyProfile {
            learner_id,
            total_violations: 0,
            last_violation_at: None,
            clean_tests_since_last_violation: 0,
            updated_at: now,
        }
    }
}

/// Profile plus the derived behavior score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyProfileView {
    #[serde(flatten)]
    pub profile: PenaltyProfile,
    pub good_behavior_score: f64,
    pub days_since_last_violation: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForgivenessKind {
    Automatic,
    ManualFull,
    ManualHalf,
}

impl ForgivenessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ForgivenessKind::Automatic => "automatic",
            ForgivenessKind::ManualFull => "manual_full",
            ForgivenessKind::ManualHalf => "manual_half",
        }
    }
}

impl fmt::Display for ForgivenessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForgivenessKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(ForgivenessKind::Automatic),
            "manual_full" => Ok(ForgivenessKind::ManualFull),
            "manual_half" => Ok(ForgivenessKind::ManualHalf),
            other => Err(AppError::InternalServerError(format!(
                "Unknown forgiveness kind '{}'",
                other
            ))),
        }
    }
}

/// Raw row of the 'forgiveness_records' table.
#[derive(Debug, FromRow)]
pub struct ForgivenessRow {
    pub id: i64,
    pub learner_id: i64,
    pub admin_id: i64,
    pub kind: String,
    pub reason: String,
    pub amount: i64,
    pub violations_before: i64,
    pub violations_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit entry for every reduction of a learner's violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgivenessRecord {
    pub id: i64,
    pub learner_id: i64,
    pub admin_id: i64,
    pub kind: ForgivenessKind,
    pub reason: String,
    pub amount: i64,
    pub violations_before: i64,
    pub violations_after: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ForgivenessRow> for ForgivenessRecord {
    type Error = AppError;

    fn try_from(row: ForgivenessRow) -> Result<Self, Self::Error> {
        Ok(ForgivenessRecord {
            id: row.id,
            learner_id: row.learner_id,
            admin_id: row.admin_id,
            kind: row.kind.parse()?,
            reason: row.reason,
            amount: row.amount,
            violations_before: row.violations_before,
            violations_after: row.violations_after,
            created_at: row.created_at,
        })
    }
}

/// Result of an eligibility check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub learner_id: i64,
    pub eligible: bool,
    pub matched_rule: Option<EligibilityRule>,
    pub can_reduce_by: i64,
    pub total_violations: i64,
    pub clean_tests_since_last_violation: i64,
    pub days_since_last_violation: Option<i64>,
    pub good_behavior_score: f64,
}

/// DTO for an automatic reduction.
#[derive(Debug, Deserialize, Validate)]
pub struct ReductionRequest {
    #[validate(length(min = 3, max = 500, message = "Reason must be between 3 and 500 characters."))]
    pub reason: String,
}

/// DTO for a manual forgiveness.
#[derive(Debug, Deserialize, Validate)]
pub struct ForgiveRequest {
    #[validate(length(min = 3, max = 500, message = "Reason must be between 3 and 500 characters."))]
    pub reason: String,

    #[serde(default)]
    pub full_forgiveness: bool,
}
