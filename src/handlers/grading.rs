// src/handlers/grading.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    engine::Policy,
    error::AppError,
    models::answer::{GradeAnswerRequest, PendingAnswersQuery},
    services::attempts,
    utils::jwt::Claims,
};

/// Lists open-response answers still waiting for a grader, oldest first.
pub async fn list_pending(
    State(pool): State<SqlitePool>,
    Query(params): Query<PendingAnswersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pending = attempts::list_pending_answers(&pool, params.test_id).await?;

    Ok(Json(pending))
}

/// Records the grader's verdict and returns the re-scored attempt.
pub async fn grade_answer(
    State(pool): State<SqlitePool>,
    State(policy): State<Policy>,
    Extension(claims): Extension<Claims>,
    Path(answer_id): Path<i64>,
    Json(payload): Json<GradeAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let grader_id = claims.user_id()?;

    let result = attempts::regrade_open_answer(
        &pool,
        &policy,
        answer_id,
        payload.is_correct,
        grader_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(result))
}
