// src/models/answer.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Grading state of a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Awaiting a human grader (open-response only).
    Pending,
    Correct,
    Incorrect,
}

impl AnswerOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerOutcome::Pending => "pending",
            AnswerOutcome::Correct => "correct",
            AnswerOutcome::Incorrect => "incorrect",
        }
    }

    pub fn from_verdict(is_correct: bool) -> Self {
        if is_correct {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect
        }
    }
}

impl fmt::Display for AnswerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerOutcome {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnswerOutcome::Pending),
            "correct" => Ok(AnswerOutcome::Correct),
            "incorrect" => Ok(AnswerOutcome::Incorrect),
            other => Err(AppError::InternalServerError(format!(
                "Unknown answer outcome '{}'",
                other
            ))),
        }
    }
}

/// Raw row of the 'answers' table.
#[derive(Debug, FromRow)]
pub struct AnswerRow {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub user_answer: String,
    pub outcome: String,
    pub answered_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
    pub grader_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub user_answer: String,
    pub outcome: AnswerOutcome,
    pub answered_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
    pub grader_id: Option<i64>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = AppError;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        Ok(Answer {
            id: row.id,
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            user_answer: row.user_answer,
            outcome: row.outcome.parse()?,
            answered_at: row.answered_at,
            graded_at: row.graded_at,
            grader_id: row.grader_id,
        })
    }
}

/// Open-response answer waiting in the grading queue.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingAnswer {
    pub answer_id: i64,
    pub attempt_id: i64,
    pub test_id: i64,
    pub learner_id: i64,
    pub question_id: i64,
    pub question_content: String,
    pub user_answer: String,
    pub answered_at: DateTime<Utc>,
}

/// DTO for submitting one answer.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,

    /// Raw text or choice. Multi-select accepts a JSON array or a comma-separated list.
    #[validate(length(min = 1, max = 5000, message = "Answer must be between 1 and 5000 characters."))]
    pub user_answer: String,
}

/// DTO for grading an open-response answer.
#[derive(Debug, Deserialize)]
pub struct GradeAnswerRequest {
    pub is_correct: bool,
}

/// Filters for the grading queue.
#[derive(Debug, Deserialize)]
pub struct PendingAnswersQuery {
    pub test_id: Option<i64>,
}
