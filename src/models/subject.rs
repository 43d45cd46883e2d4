// src/models/subject.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'subjects' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,

    /// Unique subject name (e.g., "Anatomy").
    pub name: String,

    pub description: Option<String>,

    /// Display position. Stored in the 'sort_order' column since ORDER is a
    /// reserved word in SQL, but serialized as 'order' for clients.
    #[serde(rename = "order")]
    pub sort_order: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new subject.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default, rename = "order")]
    pub sort_order: i32,
}

/// DTO for updating a subject. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateSubjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "order")]
    pub sort_order: Option<i32>,
}
