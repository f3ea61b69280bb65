// tests/common/mod.rs

#![allow(dead_code)]

use assessment_engine::{
    config::Config,
    db,
    engine::Policy,
    utils::jwt::sign_jwt,
};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::{SqlitePool, types::Json};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

/// Fresh migrated in-memory store, private to one test.
pub async fn setup_pool() -> SqlitePool {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");

    db::migrate(&pool)
        .await
        .expect("Failed to migrate database");

    pool
}

/// Migrated store in a temporary file, shared by `max_connections` connections,
/// so concurrent transactions really race inside SQLite.
pub async fn setup_file_pool(max_connections: u32) -> (SqlitePool, PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "assessment_engine_{}_{}.db",
        std::process::id(),
        rand::random::<u64>()
    ));
    let url = format!("sqlite://{}", path.display());

    let pool = db::connect(&url, max_connections)
        .await
        .expect("Failed to open file database");

    db::migrate(&pool)
        .await
        .expect("Failed to migrate database");

    (pool, path)
}

pub async fn teardown_file_pool(pool: SqlitePool, path: PathBuf) {
    pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        leaderboard_refresh_secs: 0,
        policy: Policy::default(),
    }
}

pub fn token(user_id: i64, role: &str) -> String {
    sign_jwt(user_id, role, JWT_SECRET, 600).expect("Failed to sign test token")
}

/// Inserts a test. `duration_minutes = 0` means untimed.
pub async fn seed_test(
    pool: &SqlitePool,
    duration_minutes: i64,
    deadline: Option<DateTime<Utc>>,
    shuffle_questions: bool,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tests (title, duration_minutes, deadline, shuffle_questions)
        VALUES ('Sample test', ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(duration_minutes)
    .bind(deadline)
    .bind(shuffle_questions)
    .fetch_one(pool)
    .await
    .expect("Failed to seed test");

    id
}

pub async fn seed_question(
    pool: &SqlitePool,
    test_id: i64,
    question_type: &str,
    correct_answers: &[&str],
    points: f64,
    negative_marking: f64,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO questions
            (test_id, question_type, content, options, correct_answers, points, negative_marking, order_index)
        VALUES (?, ?, 'Question text', ?, ?, ?, ?,
                (SELECT COUNT(*) FROM questions WHERE test_id = ?))
        RETURNING id
        "#,
    )
    .bind(test_id)
    .bind(question_type)
    .bind(Json(vec!["a".to_string(), "b".to_string(), "c".to_string()]))
    .bind(Json(
        correct_answers
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    ))
    .bind(points)
    .bind(negative_marking)
    .bind(test_id)
    .fetch_one(pool)
    .await
    .expect("Failed to seed question");

    id
}

/// Untimed test of single-choice questions whose correct answer is always "a".
pub async fn seed_choice_test(pool: &SqlitePool, points: &[f64]) -> (i64, Vec<i64>) {
    let test_id = seed_test(pool, 0, None, false).await;
    let mut question_ids = Vec::with_capacity(points.len());
    for p in points {
        question_ids.push(seed_question(pool, test_id, "single_choice", &["a"], *p, 0.0).await);
    }
    (test_id, question_ids)
}

/// Writes a penalty profile directly, standing in for a learner's history.
pub async fn seed_profile(
    pool: &SqlitePool,
    learner_id: i64,
    total_violations: i64,
    clean_tests: i64,
    last_violation_at: Option<DateTime<Utc>>,
) {
    sqlx::query(
        r#"
        INSERT INTO penalty_profiles
            (learner_id, total_violations, last_violation_at, clean_tests_since_last_violation, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(learner_id)
    .bind(total_violations)
    .bind(last_violation_at)
    .bind(clean_tests)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("Failed to seed penalty profile");
}
