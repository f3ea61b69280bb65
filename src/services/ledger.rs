// src/services/ledger.rs

//! Per-learner penalty history and the forgiveness audit trail.
//!
//! Forgiveness only touches `penalty_profiles`; attempt scores are never rewritten.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    engine::eligibility::{self, EligibilityPolicy},
    error::AppError,
    models::penalty::{
        EligibilityReport, ForgivenessKind, ForgivenessRecord, ForgivenessRow, PenaltyProfile,
        PenaltyProfileView,
    },
};

const PROFILE_COLUMNS: &str =
    "learner_id, total_violations, last_violation_at, clean_tests_since_last_violation, updated_at";

pub(crate) async fn ensure_profile(
    conn: &mut SqliteConnection,
    learner_id: i64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO penalty_profiles (learner_id, updated_at)
        VALUES (?, ?)
        ON CONFLICT(learner_id) DO NOTHING
        "#,
    )
    .bind(learner_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// New violation: total +1, timestamp stamped, clean streak reset.
pub(crate) async fn record_violation(
    conn: &mut SqliteConnection,
    learner_id: i64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO penalty_profiles
            (learner_id, total_violations, last_violation_at, clean_tests_since_last_violation, updated_at)
        VALUES (?, 1, ?, 0, ?)
        ON CONFLICT(learner_id) DO UPDATE SET
            total_violations = penalty_profiles.total_violations + 1,
            last_violation_at = excluded.last_violation_at,
            clean_tests_since_last_violation = 0,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(learner_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Attempt finished. Only clean attempts extend the streak.
pub(crate) async fn record_completion(
    conn: &mut SqliteConnection,
    learner_id: i64,
    clean: bool,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    ensure_profile(&mut *conn, learner_id, now).await?;

    if clean {
        sqlx::query(
            r#"
            UPDATE penalty_profiles
            SET clean_tests_since_last_violation = clean_tests_since_last_violation + 1,
                updated_at = ?
            WHERE learner_id = ?
            "#,
        )
        .bind(now)
        .bind(learner_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn fetch_profile(
    conn: &mut SqliteConnection,
    learner_id: i64,
) -> Result<Option<PenaltyProfile>, AppError> {
    let sql = format!(
        "SELECT {} FROM penalty_profiles WHERE learner_id = ?",
        PROFILE_COLUMNS
    );

    Ok(sqlx::query_as::<_, PenaltyProfile>(&sql)
        .bind(learner_id)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Takes the profile's write lock, creating the row if needed.
async fn lock_profile(
    conn: &mut SqliteConnection,
    learner_id: i64,
    now: DateTime<Utc>,
) -> Result<PenaltyProfile, AppError> {
    let sql = format!(
        r#"
        INSERT INTO penalty_profiles (learner_id, updated_at)
        VALUES (?, ?)
        ON CONFLICT(learner_id) DO UPDATE SET updated_at = penalty_profiles.updated_at
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    );

    Ok(sqlx::query_as::<_, PenaltyProfile>(&sql)
        .bind(learner_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?)
}

fn report(profile: &PenaltyProfile, now: DateTime<Utc>, policy: &EligibilityPolicy) -> EligibilityReport {
    let verdict = eligibility::check(profile, now, policy);
    let days = eligibility::days_since(profile.last_violation_at, now);

    EligibilityReport {
        learner_id: profile.learner_id,
        eligible: verdict.eligible,
        matched_rule: verdict.matched_rule,
        can_reduce_by: verdict.can_reduce_by,
        total_violations: profile.total_violations,
        clean_tests_since_last_violation: profile.clean_tests_since_last_violation,
        days_since_last_violation: days,
        good_behavior_score: eligibility::good_behavior_score(
            profile.clean_tests_since_last_violation,
            days,
            policy,
        ),
    }
}

async fn insert_forgiveness(
    conn: &mut SqliteConnection,
    profile: &PenaltyProfile,
    admin_id: i64,
    kind: ForgivenessKind,
    reason: &str,
    violations_after: i64,
    now: DateTime<Utc>,
) -> Result<ForgivenessRecord, AppError> {
    sqlx::query(
        "UPDATE penalty_profiles SET total_violations = ?, updated_at = ? WHERE learner_id = ?",
    )
    .bind(violations_after)
    .bind(now)
    .bind(profile.learner_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query_as::<_, ForgivenessRow>(
        r#"
        INSERT INTO forgiveness_records
            (learner_id, admin_id, kind, reason, amount, violations_before, violations_after, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, learner_id, admin_id, kind, reason, amount,
                  violations_before, violations_after, created_at
        "#,
    )
    .bind(profile.learner_id)
    .bind(admin_id)
    .bind(kind.as_str())
    .bind(reason)
    .bind(profile.total_violations - violations_after)
    .bind(profile.total_violations)
    .bind(violations_after)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?
    .try_into()
}

/// Current profile, or an empty one for a learner with no history.
pub async fn get_profile(
    pool: &SqlitePool,
    policy: &EligibilityPolicy,
    learner_id: i64,
    now: DateTime<Utc>,
) -> Result<PenaltyProfileView, AppError> {
    let mut conn = pool.acquire().await?;
    let profile = fetch_profile(&mut conn, learner_id)
        .await?
        .unwrap_or_else(|| PenaltyProfile::empty(learner_id, now));

    let days = eligibility::days_since(profile.last_violation_at, now);
    let good_behavior_score =
        eligibility::good_behavior_score(profile.clean_tests_since_last_violation, days, policy);

    Ok(PenaltyProfileView {
        profile,
        good_behavior_score,
        days_since_last_violation: days,
    })
}

pub async fn check_eligibility(
    pool: &SqlitePool,
    policy: &EligibilityPolicy,
    learner_id: i64,
    now: DateTime<Utc>,
) -> Result<EligibilityReport, AppError> {
    let mut conn = pool.acquire().await?;
    let profile = fetch_profile(&mut conn, learner_id)
        .await?
        .unwrap_or_else(|| PenaltyProfile::empty(learner_id, now));

    Ok(report(&profile, now, policy))
}

/// Forgives `can_reduce_by` violations if the learner is eligible right now.
///
/// Eligibility is re-evaluated under the profile lock; a stale client-side
/// check is never trusted.
pub async fn apply_automatic_reduction(
    pool: &SqlitePool,
    policy: &EligibilityPolicy,
    learner_id: i64,
    admin_id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<ForgivenessRecord, AppError> {
    let mut tx = pool.begin().await?;

    let profile = lock_profile(&mut tx, learner_id, now).await?;
    let verdict = eligibility::check(&profile, now, policy);
    if !verdict.eligible {
        tracing::warn!(learner_id, admin_id, "Automatic reduction refused");
        return Err(AppError::NotEligible(learner_id));
    }

    let violations_after = (profile.total_violations - verdict.can_reduce_by).max(0);
    let record = insert_forgiveness(
        &mut tx,
        &profile,
        admin_id,
        ForgivenessKind::Automatic,
        reason,
        violations_after,
        now,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        learner_id,
        admin_id,
        amount = record.amount,
        rule = ?verdict.matched_rule,
        "Automatic penalty reduction applied"
    );

    Ok(record)
}

/// Manual override: no eligibility check, always audited.
pub async fn forgive_penalty(
    pool: &SqlitePool,
    learner_id: i64,
    admin_id: i64,
    reason: &str,
    full_forgiveness: bool,
    now: DateTime<Utc>,
) -> Result<ForgivenessRecord, AppError> {
    let mut tx = pool.begin().await?;

    let profile = lock_profile(&mut tx, learner_id, now).await?;
    let kind = if full_forgiveness {
        ForgivenessKind::ManualFull
    } else {
        ForgivenessKind::ManualHalf
    };
    let violations_after = eligibility::forgiven_total(profile.total_violations, full_forgiveness);

    let record = insert_forgiveness(&mut tx, &profile, admin_id, kind, reason, violations_after, now)
        .await?;

    tx.commit().await?;

    tracing::info!(
        learner_id,
        admin_id,
        kind = %kind,
        amount = record.amount,
        "Penalty forgiven"
    );

    Ok(record)
}

/// Audit trail for one learner, newest first.
pub async fn list_forgiveness(
    pool: &SqlitePool,
    learner_id: i64,
) -> Result<Vec<ForgivenessRecord>, AppError> {
    sqlx::query_as::<_, ForgivenessRow>(
        r#"
        SELECT id, learner_id, admin_id, kind, reason, amount,
               violations_before, violations_after, created_at
        FROM forgiveness_records
        WHERE learner_id = ?
        ORDER BY id DESC
        "#,
    )
    .bind(learner_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(ForgivenessRecord::try_from)
    .collect()
}
