// src/models/attempt.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{error::AppError, models::answer::Answer};

/// Lifecycle of an attempt. A missing row is the "not started" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    /// Force-completed by the integrity monitor.
    Terminated,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Terminated => "terminated",
        }
    }

    /// Terminated is a sub-state of completed.
    pub fn is_finished(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "terminated" => Ok(AttemptStatus::Terminated),
            other => Err(AppError::InternalServerError(format!(
                "Unknown attempt status '{}'",
                other
            ))),
        }
    }
}

/// Raw row of the 'attempts' table.
#[derive(Debug, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub test_id: i64,
    pub learner_id: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub raw_score: f64,
    pub final_score: Option<f64>,
    pub violation_count: i64,
    pub is_terminated: bool,
    pub final_penalty_percent: f64,
}

/// One learner's run through one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub test_id: i64,
    pub learner_id: i64,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,

    /// Effective answer cut-off (duration and test deadline combined).
    pub expires_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
    pub raw_score: f64,

    /// Set once the attempt is finished.
    pub final_score: Option<f64>,

    pub violation_count: i64,
    pub is_terminated: bool,
    pub final_penalty_percent: f64,
}

impl Attempt {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            test_id: row.test_id,
            learner_id: row.learner_id,
            status: row.status.parse()?,
            started_at: row.started_at,
            expires_at: row.expires_at,
            completed_at: row.completed_at,
            raw_score: row.raw_score,
            final_score: row.final_score,
            violation_count: row.violation_count,
            is_terminated: row.is_terminated,
            final_penalty_percent: row.final_penalty_percent,
        })
    }
}

/// Full view of an attempt returned to learners and graders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt: Attempt,
    pub answers: Vec<Answer>,
    pub total_possible_points: f64,

    /// Percentage of the final score, or of the running raw score while in progress.
    pub percentage: f64,

    pub pending_answers: usize,

    /// Decided only once the attempt is finished and nothing is awaiting grading.
    pub passed: Option<bool>,
}
