// src/services/integrity.rs

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    engine::Policy,
    error::AppError,
    models::{
        attempt::{Attempt, AttemptRow, AttemptStatus},
        violation::{ViolationEvent, ViolationEventRow, ViolationOutcome, ViolationType},
    },
    services::{
        Requester,
        attempts::{ATTEMPT_COLUMNS, fetch_attempt, finalize, lock_attempt},
        ledger,
    },
};

/// Appends a violation to an in-progress attempt and terminates it when the
/// hard limit is reached.
///
/// The event, the attempt's counter and the learner's penalty profile change
/// in one transaction.
pub async fn record_violation(
    pool: &SqlitePool,
    policy: &Policy,
    attempt_id: i64,
    learner_id: i64,
    violation_type: ViolationType,
    detail: &str,
    now: DateTime<Utc>,
) -> Result<ViolationOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = lock_attempt(&mut tx, attempt_id).await?;
    if attempt.learner_id != learner_id {
        return Err(AppError::NotFound(format!("Attempt {} not found", attempt_id)));
    }
    if attempt.status != AttemptStatus::InProgress {
        tracing::warn!(attempt_id, %violation_type, "Violation reported for a finished attempt");
        return Err(AppError::AttemptNotActive(attempt_id));
    }

    let event: ViolationEvent = sqlx::query_as::<_, ViolationEventRow>(
        r#"
        INSERT INTO violation_events (attempt_id, learner_id, violation_type, detail, occurred_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, attempt_id, learner_id, violation_type, detail, occurred_at
        "#,
    )
    .bind(attempt_id)
    .bind(learner_id)
    .bind(violation_type.as_str())
    .bind(detail)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?
    .try_into()?;

    let sql = format!(
        "UPDATE attempts SET violation_count = violation_count + 1 WHERE id = ? RETURNING {}",
        ATTEMPT_COLUMNS
    );
    let mut attempt: Attempt = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(attempt_id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

    ledger::record_violation(&mut tx, learner_id, now).await?;

    let terminated = policy.integrity.should_terminate(attempt.violation_count);
    if terminated {
        attempt = finalize(&mut tx, &attempt, true, policy, now).await?;
    }

    tx.commit().await?;

    tracing::info!(
        attempt_id,
        learner_id,
        %violation_type,
        violation_count = attempt.violation_count,
        terminated,
        "Violation recorded"
    );

    Ok(ViolationOutcome {
        event,
        violation_count: attempt.violation_count,
        terminated,
        remaining_before_termination: policy
            .integrity
            .remaining_before_termination(attempt.violation_count),
        attempt,
    })
}

pub async fn list_violations(
    pool: &SqlitePool,
    attempt_id: i64,
    requester: Requester,
) -> Result<Vec<ViolationEvent>, AppError> {
    let mut conn = pool.acquire().await?;

    let attempt = fetch_attempt(&mut conn, attempt_id).await?;
    if !requester.can_view(attempt.learner_id) {
        return Err(AppError::NotFound(format!("Attempt {} not found", attempt_id)));
    }

    sqlx::query_as::<_, ViolationEventRow>(
        r#"
        SELECT id, attempt_id, learner_id, violation_type, detail, occurred_at
        FROM violation_events
        WHERE attempt_id = ?
        ORDER BY id
        "#,
    )
    .bind(attempt_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ViolationEvent::try_from)
    .collect()
}
