// src/models/leaderboard.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Population a leaderboard ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardScope {
    /// Learners by total points over finished attempts.
    Learners,
    /// Instructors by average rating received.
    Instructors,
}

impl LeaderboardScope {
    pub const ALL: [LeaderboardScope; 2] = [LeaderboardScope::Learners, LeaderboardScope::Instructors];

    pub fn as_str(self) -> &'static str {
        match self {
            LeaderboardScope::Learners => "learners",
            LeaderboardScope::Instructors => "instructors",
        }
    }
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learners" => Ok(LeaderboardScope::Learners),
            "instructors" => Ok(LeaderboardScope::Instructors),
            other => Err(AppError::NotFound(format!("Unknown leaderboard '{}'", other))),
        }
    }
}

/// One row of the denormalized ranking projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub subject_id: i64,

    /// Total points for learners, average rating for instructors.
    pub metric: f64,

    /// Finished attempts or ratings behind the metric.
    pub evidence_count: i64,

    pub snapshot_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub scope: LeaderboardScope,
    pub snapshot_at: Option<DateTime<Utc>>,
    pub total_entries: i64,
    pub entries: Vec<LeaderboardEntry>,
}

/// Query parameters for reading a leaderboard.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct LeaderboardQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,

    #[validate(range(min = 0))]
    pub offset: Option<i64>,

    /// Return only this learner's or instructor's row.
    pub subject_id: Option<i64>,
}

/// Represents the 'ratings' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: i64,
    pub instructor_id: i64,
    pub learner_id: i64,
    pub rating: i64,
    pub created_at: DateTime<Utc>,
}

/// DTO for rating an instructor.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRatingRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5."))]
    pub rating: i64,
}

/// Summary of one recomputation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeSummary {
    pub scope: LeaderboardScope,
    pub entries: usize,
    pub snapshot_at: DateTime<Utc>,
}
