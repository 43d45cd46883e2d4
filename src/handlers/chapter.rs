// src/handlers/chapter.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::PASSING_SCORE_PERCENTAGE,
    error::AppError,
    models::{chapter::Chapter, test_attempt::TestAttempt},
    utils::jwt::Claims,
};

/// Lists all chapters of a subject in display order.
pub async fn list_chapters(
    State(pool): State<PgPool>,
    Path(subject_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let chapters = sqlx::query_as::<_, Chapter>(
        r#"
        SELECT id, subject_id, title, sort_order, total_pages, created_at
        FROM chapters
        WHERE subject_id = $1
        ORDER BY sort_order, id
        "#,
    )
    .bind(subject_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(chapters))
}

/// Retrieves a single chapter by ID.
pub async fn get_chapter(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let chapter = sqlx::query_as::<_, Chapter>(
        r#"
        SELECT id, subject_id, title, sort_order, total_pages, created_at
        FROM chapters
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    Ok(Json(chapter))
}

/// Computes the caller's completion percentage for a chapter.
///
/// A question counts as completed once it appears in any of the user's
/// attempts that scored at or above the passing threshold. Derived fresh
/// from attempt history on every call; nothing is cached.
pub async fn chapter_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let _chapter = sqlx::query_as::<_, Chapter>(
        "SELECT id, subject_id, title, sort_order, total_pages, created_at FROM chapters WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    let question_ids: Vec<i64> =
        sqlx::query_scalar::<_, i64>("SELECT id FROM questions WHERE chapter_id = $1")
            .bind(id)
            .fetch_all(&pool)
            .await?;

    let attempts = sqlx::query_as::<_, TestAttempt>(
        r#"
        SELECT id, user_id, subject_id, chapter_id, page_number, questions,
               total_questions, attempted_questions, correct_answers, score,
               time_limit_minutes, time_taken_seconds, completed_at, created_at
        FROM test_attempts
        WHERE user_id = $1 AND chapter_id = $2
        "#,
    )
    .bind(user_id)
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let progress = completion_percent(&question_ids, &attempts);

    Ok(Json(serde_json::json!({ "progress": progress })))
}

/// Percentage of a chapter's questions covered by passing attempts,
/// rounded to the nearest integer. A chapter with no questions reports 0.
fn completion_percent(question_ids: &[i64], attempts: &[TestAttempt]) -> i32 {
    if question_ids.is_empty() {
        return 0;
    }

    let chapter_questions: HashSet<i64> = question_ids.iter().copied().collect();

    let completed: HashSet<i64> = attempts
        .iter()
        .filter(|attempt| attempt.score >= PASSING_SCORE_PERCENTAGE)
        .flat_map(|attempt| attempt.questions.0.iter().map(|slot| slot.question_id))
        .filter(|qid| chapter_questions.contains(qid))
        .collect();

    ((completed.len() as f64 / question_ids.len() as f64) * 100.0).round() as i32
}
