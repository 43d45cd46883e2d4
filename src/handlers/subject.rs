// src/handlers/subject.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{error::AppError, models::subject::Subject};

/// Lists all subjects in display order.
pub async fn list_subjects(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let subjects = sqlx::query_as::<_, Subject>(
        r#"
        SELECT id, name, description, sort_order, created_at
        FROM subjects
        ORDER BY sort_order, name
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(subjects))
}

/// Retrieves a single subject by ID.
pub async fn get_subject(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = sqlx::query_as::<_, Subject>(
        r#"
        SELECT id, name, description, sort_order, created_at
        FROM subjects
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Subject not found".to_string()))?;

    Ok(Json(subject))
}
