// src/models/violation.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{error::AppError, models::attempt::Attempt};

/// Kind of integrity breach reported by the proctoring client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    TabSwitch,
    CopyPaste,
    MultiFaceDetected,
    NoFaceDetected,
    WindowBlur,
    FullscreenExit,
    Other,
}

impl ViolationType {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::CopyPaste => "copy_paste",
            ViolationType::MultiFaceDetected => "multi_face_detected",
            ViolationType::NoFaceDetected => "no_face_detected",
            ViolationType::WindowBlur => "window_blur",
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::Other => "other",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tab_switch" => Ok(ViolationType::TabSwitch),
            "copy_paste" => Ok(ViolationType::CopyPaste),
            "multi_face_detected" => Ok(ViolationType::MultiFaceDetected),
            "no_face_detected" => Ok(ViolationType::NoFaceDetected),
            "window_blur" => Ok(ViolationType::WindowBlur),
            "fullscreen_exit" => Ok(ViolationType::FullscreenExit),
            "other" => Ok(ViolationType::Other),
            other => Err(AppError::InternalServerError(format!(
                "Unknown violation type '{}'",
                other
            ))),
        }
    }
}

/// Raw row of the 'violation_events' table.
#[derive(Debug, FromRow)]
pub struct ViolationEventRow {
    pub id: i64,
    pub attempt_id: i64,
    pub learner_id: i64,
    pub violation_type: String,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only record of one breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub id: i64,
    pub attempt_id: i64,
    pub learner_id: i64,
    pub violation_type: ViolationType,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

impl TryFrom<ViolationEventRow> for ViolationEvent {
    type Error = AppError;

    fn try_from(row: ViolationEventRow) -> Result<Self, Self::Error> {
        Ok(ViolationEvent {
            id: row.id,
            attempt_id: row.attempt_id,
            learner_id: row.learner_id,
            violation_type: row.violation_type.parse()?,
            detail: row.detail,
            occurred_at: row.occurred_at,
        })
    }
}

/// DTO for reporting a violation.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordViolationRequest {
    pub violation_type: ViolationType,

    #[serde(default)]
    #[validate(length(max = 1000, message = "Detail must be at most 1000 characters."))]
    pub detail: String,
}

/// What the proctoring client needs to know after a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationOutcome {
    pub event: ViolationEvent,
    pub violation_count: i64,
    pub terminated: bool,
    pub remaining_before_termination: i64,
    pub attempt: Attempt,
}
