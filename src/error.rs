// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Carries the engine's deterministic error kinds plus transport failures,
/// and maps each to an HTTP response.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error (store failures are surfaced unchanged)
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict: an in-progress attempt already exists for the pair
    AlreadyActive { learner_id: i64, test_id: i64 },

    // 409 Conflict: the attempt is no longer in progress
    AttemptNotActive(i64),

    // 409 Conflict: answers are write-once
    QuestionAlreadyAnswered { attempt_id: i64, question_id: i64 },

    // 403 Forbidden: the answer window has closed
    DeadlineExceeded(String),

    // 409 Conflict: the answer is not awaiting grading
    AlreadyGraded(i64),

    // 422 Unprocessable Entity: automatic reduction thresholds not met
    NotEligible(i64),
}

impl AppError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::AuthError(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyActive { .. } => "already_active",
            AppError::AttemptNotActive(_) => "attempt_not_active",
            AppError::QuestionAlreadyAnswered { .. } => "question_already_answered",
            AppError::DeadlineExceeded(_) => "deadline_exceeded",
            AppError::AlreadyGraded(_) => "already_graded",
            AppError::NotEligible(_) => "not_eligible",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::DeadlineExceeded(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyActive { .. }
            | AppError::AttemptNotActive(_)
            | AppError::QuestionAlreadyAnswered { .. }
            | AppError::AlreadyGraded(_) => StatusCode::CONFLICT,
            AppError::NotEligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InternalServerError(msg)
            | AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::DeadlineExceeded(msg) => f.write_str(msg),
            AppError::AlreadyActive { learner_id, test_id } => write!(
                f,
                "Learner {} already has an attempt in progress for test {}",
                learner_id, test_id
            ),
            AppError::AttemptNotActive(id) => write!(f, "Attempt {} is not in progress", id),
            AppError::QuestionAlreadyAnswered {
                attempt_id,
                question_id,
            } => write!(
                f,
                "Question {} was already answered in attempt {}",
                question_id, attempt_id
            ),
            AppError::AlreadyGraded(id) => write!(f, "Answer {} is not awaiting grading", id),
            AppError::NotEligible(id) => write!(
                f,
                "Learner {} does not meet any automatic reduction threshold",
                id
            ),
        }
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// True when the store rejected a write because of a unique index.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kinds_map_to_statuses() {
        let active = AppError::AlreadyActive {
            learner_id: 1,
            test_id: 2,
        };
        assert_eq!(active.status(), StatusCode::CONFLICT);
        assert_eq!(active.kind(), "already_active");

        let late = AppError::DeadlineExceeded("closed".into());
        assert_eq!(late.status(), StatusCode::FORBIDDEN);

        assert_eq!(AppError::NotEligible(3).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::AlreadyGraded(4).kind(), "already_graded");
    }

    #[test]
    fn test_display_is_human_readable() {
        let err = AppError::QuestionAlreadyAnswered {
            attempt_id: 9,
            question_id: 3,
        };
        assert_eq!(err.to_string(), "Question 3 was already answered in attempt 9");
    }
}
