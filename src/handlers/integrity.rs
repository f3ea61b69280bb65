// src/handlers/integrity.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    engine::Policy,
    error::AppError,
    models::violation::RecordViolationRequest,
    services::integrity,
    utils::jwt::Claims,
};

/// Reports a proctoring violation on the caller's own in-progress attempt.
pub async fn record_violation(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<RecordViolationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let learner_id = claims.user_id()?;

    let outcome = integrity::record_violation(
        &pool,
        &policy,
        attempt_id,
        learner_id,
        payload.violation_type,
        &payload.detail,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_violations(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let events = integrity::list_violations(&pool, attempt_id, claims.requester()?).await?;

    Ok(Json(events))
}
