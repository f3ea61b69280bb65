// tests/integrity_tests.rs

mod common;

use assessment_engine::{
    engine::{Policy, integrity::IntegrityPolicy},
    error::AppError,
    models::{attempt::AttemptStatus, violation::ViolationType},
    services::{Requester, attempts, integrity, ledger},
};
use chrono::Utc;

use common::{seed_choice_test, setup_pool};

const LEARNER: i64 = 11;

#[tokio::test]
async fn test_third_violation_terminates_attempt() {
    let pool = setup_pool().await;
    let policy = Policy::default();
    let (test_id, qids) = seed_choice_test(&pool, &[100.0]).await;
    let now = Utc::now();

    let attempt = attempts::start_attempt(&pool, &policy, LEARNER, test_id, now)
        .await
        .unwrap();
    attempts::submit_answer(&pool, &policy, attempt.id, LEARNER, qids[0], "a", now)
        .await
        .unwrap();

    let kinds = [
        ViolationType::TabSwitch,
        ViolationType::CopyPaste,
        ViolationType::MultiFaceDetected,
    ];
    let mut outcomes = Vec::new();
    for kind in kinds {
        outcomes.push(
            integrity::record_violation(&pool, &policy, attempt.id, LEARNER, kind, "", now)
                .await
                .unwrap(),
        );
    }

    assert!(!outcomes[0].terminated);
    assert_eq!(outcomes[0].remaining_before_termination, 2);
    assert!(!outcomes[1].terminated);
    assert_eq!(outcomes[1].remaining_before_termination, 1);

    let last = &outcomes[2];
    assert!(last.terminated);
    assert_eq!(last.violation_count, 3);
    assert_eq!(last.remaining_before_termination, 0);
    assert_eq!(last.attempt.status, AttemptStatus::Terminated);
    assert!(last.attempt.is_terminated);
    assert_eq!(last.attempt.final_score, Some(0.0));
    assert!(last.attempt.completed_at.is_some());

    // The attempt is closed for further answers and violations.
    let err = integrity::record_violation(
        &pool,
        &policy,
        attempt.id,
        LEARNER,
        ViolationType::WindowBlur,
        "",
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AttemptNotActive(_)));

    // Completing a terminated attempt returns it unchanged.
    let result = attempts::complete_attempt(&pool, &policy, attempt.id, LEARNER, now)
        .await
        .unwrap();
    assert_eq!(result.attempt.status, AttemptStatus::Terminated);
    assert_eq!(result.attempt.final_score, Some(0.0));
    assert_eq!(result.passed, Some(false));
}

#[tokio::test]
async fn test_violation_on_completed_attempt_is_rejected() {
    let pool = setup_pool().await;
    let policy = Policy::default();
    let (test_id, _) = seed_choice_test(&pool, &[10.0]).await;
    let now = Utc::now();

    let attempt = attempts::start_attempt(&pool, &policy, LEARNER, test_id, now)
        .await
        .unwrap();
    attempts::complete_attempt(&pool, &policy, attempt.id, LEARNER, now)
        .await
        .unwrap();

    let err = integrity::record_violation(
        &pool,
        &policy,
        attempt.id,
        LEARNER,
        ViolationType::TabSwitch,
        "late event",
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AttemptNotActive(_)));

    let profile = ledger::get_profile(&pool, &policy.eligibility, LEARNER, now)
        .await
        .unwrap();
    assert_eq!(profile.profile.total_violations, 0);
}

#[tokio::test]
async fn test_violation_on_someone_elses_attempt_is_not_found() {
    let pool = setup_pool().await;
    let policy = Policy::default();
    let (test_id, _) = seed_choice_test(&pool, &[10.0]).await;
    let now = Utc::now();

    let attempt = attempts::start_attempt(&pool, &policy, LEARNER, test_id, now)
        .await
        .unwrap();

    let err = integrity::record_violation(
        &pool,
        &policy,
        attempt.id,
        LEARNER + 1,
        ViolationType::TabSwitch,
        "",
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_violations_update_penalty_profile() {
    let pool = setup_pool().await;
    let policy = Policy::default();
    let (test_id, _) = seed_choice_test(&pool, &[10.0]).await;
    let now = Utc::now();

    // One clean attempt builds a streak.
    let clean = attempts::start_attempt(&pool, &policy, LEARNER, test_id, now)
        .await
        .unwrap();
    attempts::complete_attempt(&pool, &policy, clean.id, LEARNER, now)
        .await
        .unwrap();
    let view = ledger::get_profile(&pool, &policy.eligibility, LEARNER, now)
        .await
        .unwrap();
    assert_eq!(view.profile.clean_tests_since_last_violation, 1);

    // A violation resets it.
    let flagged = attempts::start_attempt(&pool, &policy, LEARNER, test_id, now)
        .await
        .unwrap();
    integrity::record_violation(
        &pool,
        &policy,
        flagged.id,
        LEARNER,
        ViolationType::NoFaceDetected,
        "camera covered",
        now,
    )
    .await
    .unwrap();
    attempts::complete_attempt(&pool, &policy, flagged.id, LEARNER, now)
        .await
        .unwrap();

    let view = ledger::get_profile(&pool, &policy.eligibility, LEARNER, now)
        .await
        .unwrap();
    assert_eq!(view.profile.total_violations, 1);
    assert_eq!(view.profile.clean_tests_since_last_violation, 0);
    assert!(view.profile.last_violation_at.is_some());
    assert_eq!(view.days_since_last_violation, Some(0));

    let events = integrity::list_violations(
        &pool,
        flagged.id,
        Requester {
            user_id: LEARNER,
            is_staff: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].violation_type, ViolationType::NoFaceDetected);
    assert_eq!(events[0].detail, "camera covered");
}

#[tokio::test]
async fn test_more_violations_never_raise_final_score() {
    let pool = setup_pool().await;
    let policy = Policy {
        integrity: IntegrityPolicy {
            hard_violation_limit: 0,
            ..IntegrityPolicy::default()
        },
        ..Policy::default()
    };
    let (test_id, qids) = seed_choice_test(&pool, &[100.0]).await;
    let now = Utc::now();

    let mut previous = f64::INFINITY;
    for (learner, violations) in [(1, 0), (2, 1), (3, 2), (4, 5), (5, 9)] {
        let attempt = attempts::start_attempt(&pool, &policy, learner, test_id, now)
            .await
            .unwrap();
        attempts::submit_answer(&pool, &policy, attempt.id, learner, qids[0], "a", now)
            .await
            .unwrap();
        for _ in 0..violations {
            integrity::record_violation(
                &pool,
                &policy,
                attempt.id,
                learner,
                ViolationType::WindowBlur,
                "",
                now,
            )
            .await
            .unwrap();
        }
        let result = attempts::complete_attempt(&pool, &policy, attempt.id, learner, now)
            .await
            .unwrap();

        let final_score = result.attempt.final_score.unwrap();
        assert!(final_score <= previous);
        assert!(result.attempt.final_penalty_percent <= policy.integrity.max_penalty_percent);
        previous = final_score;
    }

    // Capped at 50% off.
    assert_eq!(previous, 50.0);
}
