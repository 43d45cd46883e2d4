// src/models/chapter.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'chapters' table in the database.
/// A chapter belongs to exactly one subject.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,

    pub subject_id: i64,

    pub title: String,

    /// Display position within the subject.
    #[serde(rename = "order")]
    pub sort_order: i32,

    /// Number of study pages the chapter spans. Pages group questions into
    /// test-sized sets.
    pub total_pages: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new chapter.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChapterRequest {
    pub subject_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default, rename = "order")]
    pub sort_order: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub total_pages: i32,
}

/// DTO for updating a chapter. Fields are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChapterRequest {
    pub title: Option<String>,
    #[serde(rename = "order")]
    pub sort_order: Option<i32>,
    pub total_pages: Option<i32>,
}
