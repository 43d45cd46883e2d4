// src/handlers/question.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{error::AppError, models::question::Question};

/// Lists the questions of one chapter page for the study view, notes
/// included. Test-taking goes through the attempt endpoints instead, which
/// withhold the answer key.
pub async fn list_page_questions(
    State(pool): State<PgPool>,
    Path((chapter_id, page_number)): Path<(i64, i32)>,
) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, subject_id, chapter_id, page_number, question_text,
               options, correct_answer, notes, created_at
        FROM questions
        WHERE chapter_id = $1 AND page_number = $2
        ORDER BY id
        "#,
    )
    .bind(chapter_id)
    .bind(page_number)
    .fetch_all(&pool)
    .await?;

    Ok(Json(questions))
}
