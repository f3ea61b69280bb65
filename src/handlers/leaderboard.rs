// src/handlers/leaderboard.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    engine::Policy,
    error::AppError,
    models::leaderboard::{LeaderboardQuery, LeaderboardScope, SubmitRatingRequest},
    services::leaderboard,
    utils::jwt::Claims,
};

/// Public leaderboard read. `scope` is `learners` or `instructors`.
pub async fn get_leaderboard(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Path(scope): Path<String>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let scope: LeaderboardScope = scope.parse()?;

    let page =
        leaderboard::get_leaderboard(&pool, scope, &params, policy.ranking, Utc::now()).await?;

    Ok(Json(page))
}

/// Rebuilds every scope immediately instead of waiting for the timer.
pub async fn recompute(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
) -> Result<impl IntoResponse, AppError> {
    let summaries = leaderboard::recompute_all(&pool, policy.ranking, Utc::now()).await?;

    Ok(Json(summaries))
}

pub async fn rate_instructor(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(instructor_id): Path<i64>,
    Json(payload): Json<SubmitRatingRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let learner_id = claims.user_id()?;

    let rating = leaderboard::submit_rating(
        &pool,
        instructor_id,
        learner_id,
        payload.rating,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(rating)))
}
