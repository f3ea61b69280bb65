// src/handlers/penalties.rs

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
    models::penalty::{ForgiveRequest, ReductionRequest},
    services::ledger,
    utils::jwt::Claims,
};

// --- Learner-facing ---

pub async fn my_profile(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let view = ledger::get_profile(&pool, &policy.eligibility, learner_id, Utc::now()).await?;

    Ok(Json(view))
}

pub async fn my_eligibility(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let learner_id = claims.user_id()?;

    let report =
        ledger::check_eligibility(&pool, &policy.eligibility, learner_id, Utc::now()).await?;

    Ok(Json(report))
}

// --- Admin ---

pub async fn get_profile(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Path(learner_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = ledger::get_profile(&pool, &policy.eligibility, learner_id, Utc::now()).await?;

    Ok(Json(view))
}

pub async fn check_eligibility(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Path(learner_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report =
        ledger::check_eligibility(&pool, &policy.eligibility, learner_id, Utc::now()).await?;

    Ok(Json(report))
}

/// Applies the rule-based reduction. Fails with 422 when the learner does not qualify.
pub async fn apply_reduction(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
    Path(learner_id): Path<i64>,
    Json(payload): Json<ReductionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let admin_id = claims.user_id()?;

    let record = ledger::apply_automatic_reduction(
        &pool,
        &policy.eligibility,
        learner_id,
        admin_id,
        &payload.reason,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Manual forgiveness, full or half, regardless of eligibility.
pub async fn forgive(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(learner_id): Path<i64>,
    Json(payload): Json<ForgiveRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let admin_id = claims.user_id()?;

    let record = ledger::forgive_penalty(
        &pool,
        learner_id,
        admin_id,
        &payload.reason,
        payload.full_forgiveness,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn history(
    State(pool): State<SqlitePool>,
    Path(learner_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let records = ledger::list_forgiveness(&pool, learner_id).await?;

    Ok(Json(records))
}
