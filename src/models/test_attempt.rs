// src/models/test_attempt.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::models::question::{PublicQuestion, Question};

/// One slot of an attempt's embedded question list.
///
/// `selected_answer` and `is_correct` stay null from creation until the
/// attempt is submitted; an unanswered question keeps them null forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptQuestion {
    pub question_id: i64,
    pub selected_answer: Option<String>,
    pub is_correct: Option<bool>,
}

impl AttemptQuestion {
    pub fn unanswered(question_id: i64) -> Self {
        AttemptQuestion {
            question_id,
            selected_answer: None,
            is_correct: None,
        }
    }
}

/// Represents the 'test_attempts' table in the database.
///
/// An attempt references its questions by id only (no snapshot of text or
/// answer key), so later edits to a question change what results display.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttempt {
    pub id: i64,
    pub user_id: i64,
    pub subject_id: i64,
    pub chapter_id: i64,
    pub page_number: i32,

    /// Ordered question slots, stored as a JSONB array.
    pub questions: Json<Vec<AttemptQuestion>>,

    /// Fixed at creation; the score denominator for the attempt's lifetime.
    pub total_questions: i32,
    pub attempted_questions: i32,
    pub correct_answers: i32,

    /// Percentage in [0, 100], recomputed only at submission.
    pub score: f64,

    pub time_limit_minutes: i32,
    pub time_taken_seconds: i64,

    /// Null while the attempt is in progress; set exactly once at submission.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for starting a test on one chapter page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTestRequest {
    pub chapter_id: i64,
    pub page_number: i32,
}

/// DTO for submitting a test attempt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestRequest {
    /// User's answers map.
    /// Key: Question ID. Value: selected letter.
    /// Questions missing from the map count as unanswered.
    pub answers: HashMap<i64, String>,

    /// Seconds the client-side countdown ran before submission.
    #[serde(default)]
    pub time_taken_seconds: i64,
}

/// One attempt slot joined with its question, answer key withheld.
/// Used while a test is being taken.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptQuestionView {
    pub question: PublicQuestion,
    pub selected_answer: Option<String>,
    pub is_correct: Option<bool>,
}

/// Full attempt as returned by start/get: embedded questions resolved for
/// rendering, correct answers hidden.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttemptView {
    pub id: i64,
    pub user_id: i64,
    pub subject_id: i64,
    pub chapter_id: i64,
    pub page_number: i32,
    pub questions: Vec<AttemptQuestionView>,
    pub total_questions: i32,
    pub attempted_questions: i32,
    pub correct_answers: i32,
    pub score: f64,
    pub time_limit_minutes: i32,
    pub time_taken_seconds: i64,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TestAttemptView {
    /// Joins the attempt's slots with the fetched question rows, preserving
    /// slot order. Slots whose question row has since been deleted are kept
    /// with only the reference (the id) intact.
    pub fn assemble(attempt: TestAttempt, questions: &[Question]) -> Self {
        let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();

        let questions = attempt
            .questions
            .0
            .iter()
            .filter_map(|slot| {
                by_id.get(&slot.question_id).map(|q| AttemptQuestionView {
                    question: PublicQuestion::from(*q),
                    selected_answer: slot.selected_answer.clone(),
                    is_correct: slot.is_correct,
                })
            })
            .collect();

        TestAttemptView {
            id: attempt.id,
            user_id: attempt.user_id,
            subject_id: attempt.subject_id,
            chapter_id: attempt.chapter_id,
            page_number: attempt.page_number,
            questions,
            total_questions: attempt.total_questions,
            attempted_questions: attempt.attempted_questions,
            correct_answers: attempt.correct_answers,
            score: attempt.score,
            time_limit_minutes: attempt.time_limit_minutes,
            time_taken_seconds: attempt.time_taken_seconds,
            completed_at: attempt.completed_at,
        }
    }
}

/// One graded slot resolved for the results page: the full question (answer
/// key and notes included) next to what the user selected.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuestionView {
    /// Null when the question was deleted after the attempt was taken.
    pub question: Option<Question>,
    pub selected_answer: Option<String>,
    pub is_correct: Option<bool>,
}

/// Attempt resolved for display on the results page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultsResponse {
    pub id: i64,
    pub subject_name: Option<String>,
    pub chapter_title: Option<String>,
    pub page_number: i32,
    pub questions: Vec<ResultQuestionView>,
    pub total_questions: i32,
    pub attempted_questions: i32,
    pub correct_answers: i32,
    pub score: f64,
    pub time_limit_minutes: i32,
    pub time_taken_seconds: i64,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One row of the test history list: attempt totals with subject and chapter
/// names resolved, no question-level detail.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub subject_name: Option<String>,
    pub chapter_title: Option<String>,
    pub page_number: i32,
    pub total_questions: i32,
    pub attempted_questions: i32,
    pub correct_answers: i32,
    pub score: f64,
    pub time_limit_minutes: i32,
    pub time_taken_seconds: i64,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}
