// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// The four answer choices of a question, keyed by letter.
/// Stored as a JSONB object in the database; every option is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOptions {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,

    pub subject_id: i64,

    pub chapter_id: i64,

    /// Study page the question belongs to. A (chapter, page) pair selects the
    /// question set for one test.
    pub page_number: i32,

    pub question_text: String,

    pub options: Json<AnswerOptions>,

    /// The correct letter: 'A', 'B', 'C' or 'D'.
    pub correct_answer: String,

    /// Optional study notes shown on the page view.
    pub notes: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to a client that is taking a test.
/// The correct answer and notes are withheld.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub question_text: String,
    pub options: Json<AnswerOptions>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_text: q.question_text.clone(),
            options: q.options.clone(),
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    /// The owning chapter; the subject is derived from it so a question can
    /// never disagree with its chapter about the subject.
    pub chapter_id: i64,
    #[validate(range(min = 1))]
    pub page_number: i32,
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    #[validate(custom(function = validate_options))]
    pub options: AnswerOptions,
    #[validate(custom(function = validate_answer_letter))]
    pub correct_answer: String,
    #[validate(length(max = 10000))]
    pub notes: Option<String>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    pub page_number: Option<i32>,
    pub question_text: Option<String>,
    pub options: Option<AnswerOptions>,
    pub correct_answer: Option<String>,
    pub notes: Option<String>,
}

pub fn validate_options(options: &AnswerOptions) -> Result<(), validator::ValidationError> {
    for (letter, text) in [
        ("A", &options.a),
        ("B", &options.b),
        ("C", &options.c),
        ("D", &options.d),
    ] {
        if text.trim().is_empty() {
            let mut err = validator::ValidationError::new("option_cannot_be_empty");
            err.add_param("option".into(), &letter);
            return Err(err);
        }
        if text.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

pub fn validate_answer_letter(letter: &str) -> Result<(), validator::ValidationError> {
    match letter {
        "A" | "B" | "C" | "D" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_answer_letter")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> AnswerOptions {
        AnswerOptions {
            a: "Femur".to_string(),
            b: "Tibia".to_string(),
            c: "Fibula".to_string(),
            d: "Patella".to_string(),
        }
    }

    #[test]
    fn options_with_all_four_choices_pass() {
        assert!(validate_options(&options()).is_ok());
    }

    #[test]
    fn blank_option_is_rejected() {
        let mut opts = options();
        opts.c = "   ".to_string();
        assert!(validate_options(&opts).is_err());
    }

    #[test]
    fn answer_letter_must_be_a_through_d() {
        assert!(validate_answer_letter("A").is_ok());
        assert!(validate_answer_letter("D").is_ok());
        assert!(validate_answer_letter("E").is_err());
        assert!(validate_answer_letter("a").is_err());
        assert!(validate_answer_letter("").is_err());
    }
}
