// src/services/attempts.rs

//! Attempt state machine: start, answer, complete, regrade.
//!
//! Every mutation runs in one transaction whose first statement writes the
//! attempt row (or the learner's profile row on start), so the store's write
//! lock is held before anything is read.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    engine::{
        Policy, integrity,
        scoring::{self, ScoringPolicy},
    },
    error::{AppError, is_unique_violation},
    models::{
        answer::{Answer, AnswerOutcome, AnswerRow, PendingAnswer},
        attempt::{Attempt, AttemptResult, AttemptRow, AttemptStatus},
        test::{PublicQuestion, Question},
    },
    services::{Requester, catalog, ledger},
};

pub(crate) const ATTEMPT_COLUMNS: &str = "id, test_id, learner_id, status, started_at, expires_at, \
     completed_at, raw_score, final_score, violation_count, is_terminated, final_penalty_percent";

const ANSWER_COLUMNS: &str =
    "id, attempt_id, question_id, user_answer, outcome, answered_at, graded_at, grader_id";

/// Takes the attempt's write lock by bumping its version, and returns the row.
pub(crate) async fn lock_attempt(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Attempt, AppError> {
    let sql = format!(
        "UPDATE attempts SET version = version + 1 WHERE id = ? RETURNING {}",
        ATTEMPT_COLUMNS
    );

    sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(attempt_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?
        .try_into()
}

pub(crate) async fn fetch_attempt(
    conn: &mut SqliteConnection,
    attempt_id: i64,
) -> Result<Attempt, AppError> {
    let sql = format!("SELECT {} FROM attempts WHERE id = ?", ATTEMPT_COLUMNS);

    sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(attempt_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?
        .try_into()
}

async fn find_active(
    conn: &mut SqliteConnection,
    learner_id: i64,
    test_id: i64,
) -> Result<Option<Attempt>, AppError> {
    let sql = format!(
        "SELECT {} FROM attempts WHERE learner_id = ? AND test_id = ? AND status = 'in_progress'",
        ATTEMPT_COLUMNS
    );

    sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(learner_id)
        .bind(test_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Attempt::try_from)
        .transpose()
}

async fn fetch_answers(conn: &mut SqliteConnection, attempt_id: i64) -> Result<Vec<Answer>, AppError> {
    let sql = format!(
        "SELECT {} FROM answers WHERE attempt_id = ? ORDER BY question_id",
        ANSWER_COLUMNS
    );

    sqlx::query_as::<_, AnswerRow>(&sql)
        .bind(attempt_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(Answer::try_from)
        .collect()
}

/// Raw score from the full answer set. Answers to questions no longer in the
/// catalog contribute nothing.
fn score_answers(questions: &[Question], answers: &[Answer], policy: &ScoringPolicy) -> f64 {
    let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();

    scoring::raw_score(
        answers
            .iter()
            .filter_map(|a| by_id.get(&a.question_id).map(|q| (*q, a.outcome))),
        policy,
    )
}

async fn recompute_raw_score(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    policy: &ScoringPolicy,
) -> Result<f64, AppError> {
    let questions = catalog::fetch_questions(&mut *conn, attempt.test_id).await?;
    let answers = fetch_answers(&mut *conn, attempt.id).await?;
    Ok(score_answers(&questions, &answers, policy))
}

/// Moves an in-progress attempt to `completed` or `terminated`.
///
/// The violation count on `attempt` is the frozen count used for the penalty.
/// The caller must hold the attempt lock.
pub(crate) async fn finalize(
    conn: &mut SqliteConnection,
    attempt: &Attempt,
    terminated: bool,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    let raw = recompute_raw_score(&mut *conn, attempt, &policy.scoring).await?;
    let scored = integrity::final_score(raw, attempt.violation_count, terminated, &policy.integrity);
    let status = if scored.terminated {
        AttemptStatus::Terminated
    } else {
        AttemptStatus::Completed
    };

    let sql = format!(
        r#"
        UPDATE attempts
        SET status = ?, completed_at = ?, raw_score = ?, final_score = ?,
            is_terminated = ?, final_penalty_percent = ?
        WHERE id = ? AND status = 'in_progress'
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    );

    let finished: Attempt = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(status.as_str())
        .bind(now)
        .bind(raw)
        .bind(scored.final_score)
        .bind(scored.terminated)
        .bind(scored.penalty_percent)
        .bind(attempt.id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::AttemptNotActive(attempt.id))?
        .try_into()?;

    ledger::record_completion(&mut *conn, finished.learner_id, finished.violation_count == 0, now)
        .await?;

    if finished.is_terminated {
        tracing::warn!(
            attempt_id = finished.id,
            learner_id = finished.learner_id,
            violations = finished.violation_count,
            "Attempt terminated by integrity monitor"
        );
    } else {
        tracing::info!(
            attempt_id = finished.id,
            learner_id = finished.learner_id,
            raw_score = finished.raw_score,
            final_score = scored.final_score,
            penalty_percent = scored.penalty_percent,
            "Attempt completed"
        );
    }

    Ok(finished)
}

async fn load_result(conn: &mut SqliteConnection, attempt: Attempt) -> Result<AttemptResult, AppError> {
    let test = catalog::fetch_test(&mut *conn, attempt.test_id).await?;
    let questions = catalog::fetch_questions(&mut *conn, attempt.test_id).await?;
    let answers = fetch_answers(&mut *conn, attempt.id).await?;

    let total_possible_points = test.total_possible(&questions);
    let score = attempt.final_score.unwrap_or(attempt.raw_score);
    let percentage = scoring::percentage(score, total_possible_points);
    let pending_answers = answers
        .iter()
        .filter(|a| a.outcome == AnswerOutcome::Pending)
        .count();

    let passed = (attempt.status.is_finished() && pending_answers == 0)
        .then(|| !attempt.is_terminated && percentage >= test.passing_score);

    Ok(AttemptResult {
        attempt,
        answers,
        total_possible_points,
        percentage,
        pending_answers,
        passed,
    })
}

fn ensure_owner(attempt: &Attempt, learner_id: i64) -> Result<(), AppError> {
    if attempt.learner_id != learner_id {
        // Other learners' attempts are indistinguishable from missing ones.
        return Err(AppError::NotFound(format!("Attempt {} not found", attempt.id)));
    }
    Ok(())
}

/// Starts a new attempt for `(learner_id, test_id)`.
///
/// The partial unique index on in-progress attempts decides concurrent starts:
/// the loser gets `AlreadyActive`.
pub async fn start_attempt(
    pool: &SqlitePool,
    policy: &Policy,
    learner_id: i64,
    test_id: i64,
    now: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    let mut tx = pool.begin().await?;

    ledger::ensure_profile(&mut tx, learner_id, now).await?;

    let test = catalog::fetch_test(&mut tx, test_id).await?;
    if test.deadline.is_some_and(|deadline| now > deadline) {
        return Err(AppError::DeadlineExceeded(format!(
            "Test {} closed for new attempts",
            test_id
        )));
    }

    // An abandoned attempt whose window has closed is finished before the new one starts.
    if let Some(stale) = find_active(&mut tx, learner_id, test_id).await? {
        if stale.is_expired(now) {
            tracing::info!(attempt_id = stale.id, "Closing expired attempt before restart");
            lock_attempt(&mut tx, stale.id).await?;
            finalize(&mut tx, &stale, false, policy, now).await?;
        }
    }

    let sql = format!(
        r#"
        INSERT INTO attempts (test_id, learner_id, status, started_at, expires_at)
        VALUES (?, ?, 'in_progress', ?, ?)
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    );

    let inserted = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(test_id)
        .bind(learner_id)
        .bind(now)
        .bind(test.attempt_deadline(now))
        .fetch_one(&mut *tx)
        .await;

    let attempt: Attempt = match inserted {
        Ok(row) => row.try_into()?,
        Err(e) if is_unique_violation(&e) => {
            tracing::warn!(learner_id, test_id, "Rejected second active attempt");
            return Err(AppError::AlreadyActive {
                learner_id,
                test_id,
            });
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;

    tracing::info!(
        attempt_id = attempt.id,
        learner_id,
        test_id,
        "Attempt started"
    );

    Ok(attempt)
}

/// Records a write-once answer and grades it immediately when possible.
pub async fn submit_answer(
    pool: &SqlitePool,
    policy: &Policy,
    attempt_id: i64,
    learner_id: i64,
    question_id: i64,
    user_answer: &str,
    now: DateTime<Utc>,
) -> Result<Answer, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = lock_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, learner_id)?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::AttemptNotActive(attempt_id));
    }

    let test = catalog::fetch_test(&mut tx, attempt.test_id).await?;
    let past_test_deadline = test.deadline.is_some_and(|deadline| now > deadline);
    if attempt.is_expired(now) || past_test_deadline {
        return Err(AppError::DeadlineExceeded(format!(
            "Attempt {} no longer accepts answers",
            attempt_id
        )));
    }

    let question = catalog::fetch_question(&mut tx, attempt.test_id, question_id).await?;
    let outcome = scoring::grade(&question, user_answer);

    let sql = format!(
        r#"
        INSERT INTO answers (attempt_id, question_id, user_answer, outcome, answered_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        ANSWER_COLUMNS
    );

    let inserted = sqlx::query_as::<_, AnswerRow>(&sql)
        .bind(attempt_id)
        .bind(question_id)
        .bind(user_answer)
        .bind(outcome.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

    let answer: Answer = match inserted {
        Ok(row) => row.try_into()?,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::QuestionAlreadyAnswered {
                attempt_id,
                question_id,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let raw = recompute_raw_score(&mut tx, &attempt, &policy.scoring).await?;
    sqlx::query("UPDATE attempts SET raw_score = ? WHERE id = ?")
        .bind(raw)
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!(attempt_id, question_id, outcome = %answer.outcome, "Answer recorded");

    Ok(answer)
}

/// Finishes the attempt. Calling it again returns the stored result.
pub async fn complete_attempt(
    pool: &SqlitePool,
    policy: &Policy,
    attempt_id: i64,
    learner_id: i64,
    now: DateTime<Utc>,
) -> Result<AttemptResult, AppError> {
    let mut tx = pool.begin().await?;

    let mut attempt = lock_attempt(&mut tx, attempt_id).await?;
    ensure_owner(&attempt, learner_id)?;

    if !attempt.status.is_finished() {
        attempt = finalize(&mut tx, &attempt, false, policy, now).await?;
    }

    let result = load_result(&mut tx, attempt).await?;
    tx.commit().await?;

    Ok(result)
}

/// Grades a pending open-response answer of a finished attempt and re-derives
/// the attempt's scores from the full answer set.
pub async fn regrade_open_answer(
    pool: &SqlitePool,
    policy: &Policy,
    answer_id: i64,
    is_correct: bool,
    grader_id: i64,
    now: DateTime<Utc>,
) -> Result<AttemptResult, AppError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        UPDATE attempts SET version = version + 1
        WHERE id = (SELECT attempt_id FROM answers WHERE id = ?)
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    );

    let attempt: Attempt = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(answer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Answer {} not found", answer_id)))?
        .try_into()?;

    // Answers of a running attempt are not awaiting grading yet.
    if !attempt.status.is_finished() {
        return Err(AppError::AlreadyGraded(answer_id));
    }

    let graded = sqlx::query(
        r#"
        UPDATE answers
        SET outcome = ?, graded_at = ?, grader_id = ?
        WHERE id = ? AND outcome = 'pending'
        "#,
    )
    .bind(AnswerOutcome::from_verdict(is_correct).as_str())
    .bind(now)
    .bind(grader_id)
    .bind(answer_id)
    .execute(&mut *tx)
    .await?;

    if graded.rows_affected() == 0 {
        return Err(AppError::AlreadyGraded(answer_id));
    }

    let raw = recompute_raw_score(&mut tx, &attempt, &policy.scoring).await?;
    let scored = integrity::final_score(
        raw,
        attempt.violation_count,
        attempt.is_terminated,
        &policy.integrity,
    );

    let sql = format!(
        "UPDATE attempts SET raw_score = ?, final_score = ?, final_penalty_percent = ? WHERE id = ? RETURNING {}",
        ATTEMPT_COLUMNS
    );

    let updated: Attempt = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(raw)
        .bind(scored.final_score)
        .bind(scored.penalty_percent)
        .bind(attempt.id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

    let result = load_result(&mut tx, updated).await?;
    tx.commit().await?;

    tracing::info!(
        answer_id,
        attempt_id = attempt.id,
        grader_id,
        is_correct,
        final_score = scored.final_score,
        "Open answer graded"
    );

    Ok(result)
}

pub async fn get_attempt_result(
    pool: &SqlitePool,
    attempt_id: i64,
    requester: Requester,
) -> Result<AttemptResult, AppError> {
    let mut conn = pool.acquire().await?;

    let attempt = fetch_attempt(&mut conn, attempt_id).await?;
    if !requester.can_view(attempt.learner_id) {
        return Err(AppError::NotFound(format!("Attempt {} not found", attempt_id)));
    }

    load_result(&mut conn, attempt).await
}

/// Questions of the attempt's test without answer keys.
///
/// When the test shuffles questions, the order is fixed per attempt so a
/// reload shows the same paper.
pub async fn get_paper(
    pool: &SqlitePool,
    attempt_id: i64,
    learner_id: i64,
) -> Result<Vec<PublicQuestion>, AppError> {
    let mut conn = pool.acquire().await?;

    let attempt = fetch_attempt(&mut conn, attempt_id).await?;
    ensure_owner(&attempt, learner_id)?;

    let test = catalog::fetch_test(&mut conn, attempt.test_id).await?;
    let mut questions = catalog::fetch_questions(&mut conn, attempt.test_id).await?;

    if test.shuffle_questions {
        let mut rng = StdRng::seed_from_u64(attempt.id as u64);
        questions.shuffle(&mut rng);
    }

    Ok(questions.into_iter().map(PublicQuestion::from).collect())
}

/// Open-response answers of finished attempts still waiting for a grader, oldest first.
pub async fn list_pending_answers(
    pool: &SqlitePool,
    test_id: Option<i64>,
) -> Result<Vec<PendingAnswer>, AppError> {
    let pending = sqlx::query_as::<_, PendingAnswer>(
        r#"
        SELECT
            a.id AS answer_id,
            a.attempt_id,
            t.test_id,
            t.learner_id,
            a.question_id,
            q.content AS question_content,
            a.user_answer,
            a.answered_at
        FROM answers a
        JOIN attempts t ON t.id = a.attempt_id
        JOIN questions q ON q.id = a.question_id
        WHERE a.outcome = 'pending'
          AND t.status != 'in_progress'
          AND (? IS NULL OR t.test_id = ?)
        ORDER BY a.id
        "#,
    )
    .bind(test_id)
    .bind(test_id)
    .fetch_all(pool)
    .await?;

    Ok(pending)
}
