// src/handlers/attempts.rs

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
    models::answer::SubmitAnswerRequest,
    services::attempts,
    utils::jwt::Claims,
};

/// Opens a new attempt of a test for the calling learner.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let attempt = attempts::start_attempt(&pool, &policy, learner_id, test_id, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Returns the attempt together with its answers and score breakdown.
/// Staff can read any attempt; learners only their own.
pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = attempts::get_attempt_result(&pool, attempt_id, claims.requester()?).await?;

    Ok(Json(result))
}

/// Returns the question paper in the attempt's presentation order, without answer keys.
pub async fn get_paper(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let paper = attempts::get_paper(&pool, attempt_id, learner_id).await?;

    Ok(Json(paper))
}

pub async fn submit_answer(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let learner_id = claims.user_id()?;

    let answer = attempts::submit_answer(
        &pool,
        &policy,
        attempt_id,
        learner_id,
        payload.question_id,
        &payload.user_answer,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(answer)))
}

/// Finishes the attempt. Calling it again on a finished attempt returns the stored result.
pub async fn complete_attempt(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let result =
        attempts::complete_attempt(&pool, &policy, attempt_id, learner_id, Utc::now()).await?;

    Ok(Json(result))
}
