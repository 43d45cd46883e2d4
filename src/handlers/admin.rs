// src/handlers/admin.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        chapter::{CreateChapterRequest, UpdateChapterRequest},
        question::{
            AnswerOptions, CreateQuestionRequest, UpdateQuestionRequest, validate_answer_letter,
            validate_options,
        },
        subject::{CreateSubjectRequest, Subject, UpdateSubjectRequest},
    },
    utils::csv::CsvTable,
};

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// Creates a new subject.
/// Admin only.
pub async fn create_subject(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let subject = sqlx::query_as::<_, Subject>(
        r#"
        INSERT INTO subjects (name, description, sort_order)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, sort_order, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.sort_order)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Subject '{}' already exists", payload.name))
        } else {
            tracing::error!("Failed to create subject: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(subject)))
}

/// Updates a subject by ID.
/// Admin only.
pub async fn update_subject(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.is_none() && payload.description.is_none() && payload.sort_order.is_none() {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE subjects SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(sort_order) = payload.sort_order {
        separated.push("sort_order = ");
        separated.push_bind_unseparated(sort_order);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict("Subject name already exists".to_string())
        } else {
            tracing::error!("Failed to update subject: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a subject by ID.
/// Admin only. A subject that chapters still reference cannot be deleted.
pub async fn delete_subject(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            // Postgres error code for foreign key violation is 23503
            if e.to_string().contains("foreign key") || e.to_string().contains("23503") {
                AppError::Conflict("Subject still has chapters".to_string())
            } else {
                tracing::error!("Failed to delete subject: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

/// Creates a new chapter under an existing subject.
/// Admin only.
pub async fn create_chapter(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    sqlx::query_scalar::<_, i64>("SELECT id FROM subjects WHERE id = $1")
        .bind(payload.subject_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Subject not found".to_string()))?;

    let chapter = sqlx::query_as::<_, crate::models::chapter::Chapter>(
        r#"
        INSERT INTO chapters (subject_id, title, sort_order, total_pages)
        VALUES ($1, $2, $3, $4)
        RETURNING id, subject_id, title, sort_order, total_pages, created_at
        "#,
    )
    .bind(payload.subject_id)
    .bind(&payload.title)
    .bind(payload.sort_order)
    .bind(payload.total_pages)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create chapter: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(chapter)))
}

/// Updates a chapter by ID.
/// Admin only.
pub async fn update_chapter(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.is_none() && payload.sort_order.is_none() && payload.total_pages.is_none() {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE chapters SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(sort_order) = payload.sort_order {
        separated.push("sort_order = ");
        separated.push_bind_unseparated(sort_order);
    }

    if let Some(total_pages) = payload.total_pages {
        separated.push("total_pages = ");
        separated.push_bind_unseparated(total_pages);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update chapter: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Chapter not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a chapter and every question it owns in one transaction, so no
/// question can be left referencing a deleted chapter.
/// Admin only.
pub async fn delete_chapter(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM questions WHERE chapter_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        // Dropping the transaction rolls back the question delete.
        return Err(AppError::NotFound("Chapter not found".to_string()));
    }

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// Creates a new question on a chapter page. The subject is taken from the
/// owning chapter.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let subject_id =
        sqlx::query_scalar::<_, i64>("SELECT subject_id FROM chapters WHERE id = $1")
            .bind(payload.chapter_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO questions
        (subject_id, chapter_id, page_number, question_text, options, correct_answer, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(subject_id)
    .bind(payload.chapter_id)
    .bind(payload.page_number)
    .bind(&payload.question_text)
    .bind(SqlJson(&payload.options))
    .bind(&payload.correct_answer)
    .bind(&payload.notes)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Updates a question by ID.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.page_number.is_none()
        && payload.question_text.is_none()
        && payload.options.is_none()
        && payload.correct_answer.is_none()
        && payload.notes.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let Some(options) = &payload.options {
        validate_options(options).map_err(|e| AppError::BadRequest(e.to_string()))?;
    }
    if let Some(letter) = &payload.correct_answer {
        validate_answer_letter(letter).map_err(|e| AppError::BadRequest(e.to_string()))?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(page_number) = payload.page_number {
        separated.push("page_number = ");
        separated.push_bind_unseparated(page_number);
    }

    if let Some(question_text) = payload.question_text {
        separated.push("question_text = ");
        separated.push_bind_unseparated(question_text);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(SqlJson(options));
    }

    if let Some(correct_answer) = payload.correct_answer {
        separated.push("correct_answer = ");
        separated.push_bind_unseparated(correct_answer);
    }

    if let Some(notes) = payload.notes {
        separated.push("notes = ");
        separated.push_bind_unseparated(notes);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// CSV import
// ---------------------------------------------------------------------------

/// One validated row of an uploaded content CSV.
#[derive(Debug)]
struct ContentRow {
    subject: String,
    chapter: String,
    page_number: i32,
    question_text: String,
    options: AnswerOptions,
    correct_answer: String,
    notes: Option<String>,
}

/// Parses and validates every row of the uploaded CSV up front, so a bad row
/// rejects the file before anything is written.
fn parse_content_rows(input: &str) -> Result<Vec<ContentRow>, AppError> {
    let table = CsvTable::parse(input)?;

    let subject_col = table.required_column("Subject")?;
    let chapter_col = table.required_column("Chapter")?;
    let page_col = table.required_column("PageNumber")?;
    let text_col = table.required_column("QuestionText")?;
    let option_cols = [
        table.required_column("OptionA")?,
        table.required_column("OptionB")?,
        table.required_column("OptionC")?,
        table.required_column("OptionD")?,
    ];
    let answer_col = table.required_column("CorrectAnswer")?;
    let notes_col = table.column("NotesContent");

    let field = |row: &[String], col: usize| row.get(col).map(|s| s.trim().to_string());

    let mut rows = Vec::with_capacity(table.rows.len());
    for (i, raw) in table.rows.iter().enumerate() {
        // Header is line 1, so the first data row is line 2.
        let line = i + 2;
        let bad = |what: &str| AppError::BadRequest(format!("Row {}: {}", line, what));

        let subject = field(raw, subject_col).filter(|s| !s.is_empty());
        let chapter = field(raw, chapter_col).filter(|s| !s.is_empty());
        let question_text = field(raw, text_col).filter(|s| !s.is_empty());

        let page_number = field(raw, page_col)
            .and_then(|s| s.parse::<i32>().ok())
            .filter(|&n| n >= 1)
            .ok_or_else(|| bad("PageNumber must be a positive integer"))?;

        let options = AnswerOptions {
            a: field(raw, option_cols[0]).unwrap_or_default(),
            b: field(raw, option_cols[1]).unwrap_or_default(),
            c: field(raw, option_cols[2]).unwrap_or_default(),
            d: field(raw, option_cols[3]).unwrap_or_default(),
        };
        validate_options(&options).map_err(|_| bad("all four options must be non-empty"))?;

        let correct_answer = field(raw, answer_col)
            .ok_or_else(|| bad("CorrectAnswer is required"))?;
        validate_answer_letter(&correct_answer)
            .map_err(|_| bad("CorrectAnswer must be one of A, B, C, D"))?;

        rows.push(ContentRow {
            subject: subject.ok_or_else(|| bad("Subject is required"))?,
            chapter: chapter.ok_or_else(|| bad("Chapter is required"))?,
            page_number,
            question_text: question_text.ok_or_else(|| bad("QuestionText is required"))?,
            options,
            correct_answer,
            notes: notes_col.and_then(|col| field(raw, col)).filter(|s| !s.is_empty()),
        });
    }

    Ok(rows)
}

/// Imports content from an uploaded CSV file.
///
/// Subjects are created-or-reused by exact name, chapters by (subject, exact
/// title); every row creates a new question. The whole file imports in one
/// transaction: a failing row leaves the store untouched.
/// Admin only.
pub async fn upload_content(
    State(pool): State<PgPool>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut csv_text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() == Some("file") {
            let text = field
                .text()
                .await
                .map_err(|_| AppError::BadRequest("Failed to read uploaded file".to_string()))?;
            csv_text = Some(text);
        }
    }

    let csv_text = csv_text.ok_or(AppError::BadRequest("No file uploaded".to_string()))?;
    let rows = parse_content_rows(&csv_text)?;

    let mut subjects_touched: HashSet<i64> = HashSet::new();
    let mut chapters_touched: HashSet<i64> = HashSet::new();
    let mut questions_created: i64 = 0;

    let mut tx = pool.begin().await?;

    for row in &rows {
        // Create or reuse subject by exact name
        let subject_id = match sqlx::query_scalar::<_, i64>("SELECT id FROM subjects WHERE name = $1")
            .bind(&row.subject)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(id) => id,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO subjects (name) VALUES ($1) RETURNING id",
                )
                .bind(&row.subject)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        subjects_touched.insert(subject_id);

        // Create or reuse chapter by (subject, exact title)
        let chapter_id = match sqlx::query_scalar::<_, i64>(
            "SELECT id FROM chapters WHERE subject_id = $1 AND title = $2",
        )
        .bind(subject_id)
        .bind(&row.chapter)
        .fetch_optional(&mut *tx)
        .await?
        {
            Some(id) => id,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO chapters (subject_id, title) VALUES ($1, $2) RETURNING id",
                )
                .bind(subject_id)
                .bind(&row.chapter)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        chapters_touched.insert(chapter_id);

        // Always create a new question
        sqlx::query(
            r#"
            INSERT INTO questions
            (subject_id, chapter_id, page_number, question_text, options, correct_answer, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(subject_id)
        .bind(chapter_id)
        .bind(row.page_number)
        .bind(&row.question_text)
        .bind(SqlJson(&row.options))
        .bind(&row.correct_answer)
        .bind(&row.notes)
        .execute(&mut *tx)
        .await?;
        questions_created += 1;
    }

    tx.commit().await?;

    tracing::info!(
        "CSV import: {} subjects, {} chapters, {} questions",
        subjects_touched.len(),
        chapters_touched.len(),
        questions_created
    );

    Ok(Json(serde_json::json!({
        "message": "Content uploaded successfully",
        "stats": {
            "totalSubjects": subjects_touched.len(),
            "totalChapters": chapters_touched.len(),
            "totalQuestions": questions_created,
        }
    })))
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Returns system-wide content and attempt counts.
/// Admin only.
pub async fn get_stats(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let total_subjects = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subjects")
        .fetch_one(&pool)
        .await?;
    let total_chapters = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chapters")
        .fetch_one(&pool)
        .await?;
    let total_questions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions")
        .fetch_one(&pool)
        .await?;
    let total_test_attempts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM test_attempts")
        .fetch_one(&pool)
        .await?;

    Ok(Json(serde_json::json!({
        "totalSubjects": total_subjects,
        "totalChapters": total_chapters,
        "totalQuestions": total_questions,
        "totalTestAttempts": total_test_attempts,
    })))
}
