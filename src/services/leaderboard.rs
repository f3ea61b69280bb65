// src/services/leaderboard.rs

//! Leaderboard projection: rebuilt wholesale per scope, swapped atomically.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    engine::ranking::{self, RankingPolicy},
    error::AppError,
    models::leaderboard::{
        LeaderboardEntry, LeaderboardPage, LeaderboardQuery, LeaderboardScope, Rating,
        RecomputeSummary,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 50;

async fn learner_inputs(conn: &mut SqliteConnection) -> Result<Vec<ranking::RankInput>, AppError> {
    let rows: Vec<(i64, i64, f64)> = sqlx::query_as(
        r#"
        SELECT learner_id, id, COALESCE(final_score, 0.0)
        FROM attempts
        WHERE status != 'in_progress'
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(ranking::aggregate_learners(&rows))
}

async fn instructor_inputs(
    conn: &mut SqliteConnection,
) -> Result<Vec<ranking::RankInput>, AppError> {
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT instructor_id, rating FROM ratings ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;

    Ok(ranking::aggregate_instructors(&rows))
}

/// Rebuilds one scope from the current source rows.
///
/// The old rows are deleted first, which takes the write lock; the new
/// snapshot only becomes visible at commit, so readers see either the old or
/// the new leaderboard, never a mix.
pub async fn recompute(
    pool: &SqlitePool,
    scope: LeaderboardScope,
    policy: RankingPolicy,
    now: DateTime<Utc>,
) -> Result<RecomputeSummary, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM leaderboard_entries WHERE scope = ?")
        .bind(scope.as_str())
        .execute(&mut *tx)
        .await?;

    let inputs = match scope {
        LeaderboardScope::Learners => learner_inputs(&mut tx).await?,
        LeaderboardScope::Instructors => instructor_inputs(&mut tx).await?,
    };
    let ranked = ranking::rank(inputs, policy);

    for entry in &ranked {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_entries
                (scope, subject_id, rank, metric, evidence_count, snapshot_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(scope.as_str())
        .bind(entry.subject_id)
        .bind(entry.rank)
        .bind(entry.metric)
        .bind(entry.evidence_count)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(scope = %scope, entries = ranked.len(), %policy, "Leaderboard recomputed");

    Ok(RecomputeSummary {
        scope,
        entries: ranked.len(),
        snapshot_at: now,
    })
}

pub async fn recompute_all(
    pool: &SqlitePool,
    policy: RankingPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<RecomputeSummary>, AppError> {
    let mut summaries = Vec::with_capacity(LeaderboardScope::ALL.len());
    for scope in LeaderboardScope::ALL {
        summaries.push(recompute(pool, scope, policy, now).await?);
    }
    Ok(summaries)
}

async fn has_source_rows(pool: &SqlitePool, scope: LeaderboardScope) -> Result<bool, AppError> {
    let sql = match scope {
        LeaderboardScope::Learners => {
            "SELECT EXISTS(SELECT 1 FROM attempts WHERE status != 'in_progress')"
        }
        LeaderboardScope::Instructors => "SELECT EXISTS(SELECT 1 FROM ratings)",
    };

    let (exists,): (bool,) = sqlx::query_as(sql).fetch_one(pool).await?;
    Ok(exists)
}

/// Size and entries come from one read transaction, so a recompute that
/// commits in between cannot mix two snapshots into one page.
async fn read_page(
    pool: &SqlitePool,
    scope: LeaderboardScope,
    query: &LeaderboardQuery,
) -> Result<LeaderboardPage, AppError> {
    let mut tx = pool.begin().await?;

    let (total_entries, snapshot_at): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(snapshot_at) FROM leaderboard_entries WHERE scope = ?",
    )
    .bind(scope.as_str())
    .fetch_one(&mut *tx)
    .await?;

    let entries = match query.subject_id {
        Some(subject_id) => {
            sqlx::query_as::<_, LeaderboardEntry>(
                r#"
                SELECT rank, subject_id, metric, evidence_count, snapshot_at
                FROM leaderboard_entries
                WHERE scope = ? AND subject_id = ?
                "#,
            )
            .bind(scope.as_str())
            .bind(subject_id)
            .fetch_all(&mut *tx)
            .await?
        }
        None => {
            let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);
            let offset = query.offset.unwrap_or(0).max(0);

            sqlx::query_as::<_, LeaderboardEntry>(
                r#"
                SELECT rank, subject_id, metric, evidence_count, snapshot_at
                FROM leaderboard_entries
                WHERE scope = ?
                ORDER BY rank, metric DESC, evidence_count DESC, subject_id
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(scope.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    Ok(LeaderboardPage {
        scope,
        snapshot_at,
        total_entries,
        entries,
    })
}

/// Reads the latest snapshot, computing one first if the scope has none yet
/// but has something to rank.
pub async fn get_leaderboard(
    pool: &SqlitePool,
    scope: LeaderboardScope,
    query: &LeaderboardQuery,
    policy: RankingPolicy,
    now: DateTime<Utc>,
) -> Result<LeaderboardPage, AppError> {
    let page = read_page(pool, scope, query).await?;
    if page.total_entries > 0 || !has_source_rows(pool, scope).await? {
        return Ok(page);
    }

    recompute(pool, scope, policy, now).await?;
    read_page(pool, scope, query).await
}

/// Records a learner's rating of an instructor. Re-rating replaces the value.
pub async fn submit_rating(
    pool: &SqlitePool,
    instructor_id: i64,
    learner_id: i64,
    rating: i64,
    now: DateTime<Utc>,
) -> Result<Rating, AppError> {
    if instructor_id == learner_id {
        return Err(AppError::BadRequest("You cannot rate yourself".to_string()));
    }
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5.".to_string()));
    }

    let saved = sqlx::query_as::<_, Rating>(
        r#"
        INSERT INTO ratings (instructor_id, learner_id, rating, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(instructor_id, learner_id) DO UPDATE SET
            rating = excluded.rating,
            created_at = excluded.created_at
        RETURNING id, instructor_id, learner_id, rating, created_at
        "#,
    )
    .bind(instructor_id)
    .bind(learner_id)
    .bind(rating)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(instructor_id, learner_id, rating, "Instructor rated");

    Ok(saved)
}
