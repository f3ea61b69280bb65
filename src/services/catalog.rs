// src/services/catalog.rs

//! Read-only access to the catalog's tests and questions.

use sqlx::SqliteConnection;

use crate::{
    error::AppError,
    models::test::{Question, QuestionRow, TestMeta},
};

const QUESTION_COLUMNS: &str = "id, test_id, question_type, content, options, correct_answers, \
     points, negative_marking, order_index";

pub async fn fetch_test(conn: &mut SqliteConnection, test_id: i64) -> Result<TestMeta, AppError> {
    sqlx::query_as::<_, TestMeta>(
        r#"
        SELECT id, title, duration_minutes, deadline, total_points, passing_score, shuffle_questions
        FROM tests
        WHERE id = ?
        "#,
    )
    .bind(test_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Test {} not found", test_id)))
}

/// Questions of a test in presentation order.
pub async fn fetch_questions(
    conn: &mut SqliteConnection,
    test_id: i64,
) -> Result<Vec<Question>, AppError> {
    let sql = format!(
        "SELECT {} FROM questions WHERE test_id = ? ORDER BY order_index, id",
        QUESTION_COLUMNS
    );

    sqlx::query_as::<_, QuestionRow>(&sql)
        .bind(test_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(Question::try_from)
        .collect()
}

/// A question that belongs to `test_id`. Questions of other tests are reported as missing.
pub async fn fetch_question(
    conn: &mut SqliteConnection,
    test_id: i64,
    question_id: i64,
) -> Result<Question, AppError> {
    let sql = format!(
        "SELECT {} FROM questions WHERE id = ? AND test_id = ?",
        QUESTION_COLUMNS
    );

    let row = sqlx::query_as::<_, QuestionRow>(&sql)
        .bind(question_id)
        .bind(test_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Question {} not found in test {}",
                question_id, test_id
            ))
        })?;

    Question::try_from(row)
}
