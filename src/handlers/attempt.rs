// src/handlers/attempt.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, types::Json as SqlJson};

use crate::{
    config::HISTORY_LIMIT,
    error::AppError,
    models::{
        question::Question,
        test_attempt::{
            AttemptQuestion, HistoryEntry, ResultQuestionView, StartTestRequest,
            SubmitTestRequest, TestAttempt, TestAttemptView, TestResultsResponse,
        },
    },
    utils::jwt::Claims,
};

/// Minutes allotted for a test: 2 minutes per question, rounded up so that
/// even a single-question page gets a full minute.
fn time_limit_minutes(question_count: usize) -> i32 {
    question_count.div_ceil(2) as i32
}

/// Outcome of grading one submission against the attempt's answer keys.
struct Grade {
    entries: Vec<AttemptQuestion>,
    attempted: i32,
    correct: i32,
    score: f64,
}

/// Grades every slot of an attempt against the stored answer keys.
///
/// A slot whose question id is missing from the submitted map counts as
/// unanswered: both fields stay null and it contributes to neither
/// `attempted` nor `correct`. A submitted answer is stored verbatim and
/// grades by exact string equality, so anything that is not the correct
/// letter (including junk input) simply grades false.
fn grade_submission(
    slots: &[AttemptQuestion],
    answer_keys: &HashMap<i64, String>,
    submitted: &HashMap<i64, String>,
) -> Grade {
    let mut attempted = 0;
    let mut correct = 0;

    let entries: Vec<AttemptQuestion> = slots
        .iter()
        .map(|slot| {
            let Some(selected) = submitted.get(&slot.question_id) else {
                return AttemptQuestion::unanswered(slot.question_id);
            };

            attempted += 1;
            let is_correct = answer_keys
                .get(&slot.question_id)
                .is_some_and(|key| key == selected);
            if is_correct {
                correct += 1;
            }

            AttemptQuestion {
                question_id: slot.question_id,
                selected_answer: Some(selected.clone()),
                is_correct: Some(is_correct),
            }
        })
        .collect();

    let score = if entries.is_empty() {
        0.0
    } else {
        (f64::from(correct) / entries.len() as f64) * 100.0
    };

    Grade {
        entries,
        attempted,
        correct,
        score,
    }
}

const ATTEMPT_COLUMNS: &str = "id, user_id, subject_id, chapter_id, page_number, questions, \
     total_questions, attempted_questions, correct_answers, score, \
     time_limit_minutes, time_taken_seconds, completed_at, created_at";

/// Fetches an attempt and enforces ownership: only the creating user may
/// read or submit it, with no admin override.
async fn fetch_owned_attempt(
    pool: &PgPool,
    test_id: i64,
    user_id: i64,
) -> Result<TestAttempt, AppError> {
    let attempt = sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM test_attempts WHERE id = $1"
    ))
    .bind(test_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Test attempt not found".to_string()))?;

    if attempt.user_id != user_id {
        return Err(AppError::Forbidden("Not authorized".to_string()));
    }

    Ok(attempt)
}

/// Fetches the question rows an attempt references, in no particular order.
async fn fetch_attempt_questions(
    pool: &PgPool,
    attempt: &TestAttempt,
) -> Result<Vec<Question>, AppError> {
    let ids: Vec<i64> = attempt.questions.0.iter().map(|s| s.question_id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    // Dynamic IN clause over the attempt's question ids
    let mut query_builder = sqlx::QueryBuilder::<Postgres>::new(
        "SELECT id, subject_id, chapter_id, page_number, question_text, \
         options, correct_answer, notes, created_at \
         FROM questions WHERE id IN (",
    );

    let mut separated = query_builder.separated(",");
    for id in &ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let questions: Vec<Question> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(questions)
}

/// Starts a new test for one chapter page.
///
/// * Loads the page's questions; a page with no questions cannot start a test.
/// * Derives the subject from the first question (the content store keeps a
///   page within a single subject).
/// * Persists the attempt with every slot unanswered and returns it in full,
///   questions embedded, so the client can render the test immediately.
pub async fn start_test(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartTestRequest>,
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
    .bind(req.chapter_id)
    .bind(req.page_number)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch page questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if questions.is_empty() {
        return Err(AppError::NotFound(
            "No questions found for this page".to_string(),
        ));
    }

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let subject_id = questions[0].subject_id;
    let slots: Vec<AttemptQuestion> = questions
        .iter()
        .map(|q| AttemptQuestion::unanswered(q.id))
        .collect();

    let attempt = sqlx::query_as::<_, TestAttempt>(&format!(
        "INSERT INTO test_attempts \
             (user_id, subject_id, chapter_id, page_number, questions, \
              total_questions, time_limit_minutes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(user_id)
    .bind(subject_id)
    .bind(req.chapter_id)
    .bind(req.page_number)
    .bind(SqlJson(&slots))
    .bind(slots.len() as i32)
    .bind(time_limit_minutes(slots.len()))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(TestAttemptView::assemble(attempt, &questions)),
    ))
}

/// Retrieves an in-progress (or completed) attempt with its questions
/// embedded for rendering, answer keys withheld.
pub async fn get_test(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let attempt = fetch_owned_attempt(&pool, test_id, user_id).await?;
    let questions = fetch_attempt_questions(&pool, &attempt).await?;

    Ok(Json(TestAttemptView::assemble(attempt, &questions)))
}

/// Submits a test attempt's answers and fixes its score.
///
/// Grading recomputes `attempted_questions`, `correct_answers` and `score`
/// from scratch and stamps `completed_at`. The write is a single conditional
/// UPDATE keyed on the attempt id and `completed_at IS NULL`, which makes the
/// operation atomic for concurrent readers and serializable per attempt: of
/// two racing submits, exactly one wins and the other gets a Conflict.
pub async fn submit_test(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(req): Json<SubmitTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let attempt = fetch_owned_attempt(&pool, test_id, user_id).await?;

    if attempt.completed_at.is_some() {
        return Err(AppError::Conflict(
            "Test attempt already submitted".to_string(),
        ));
    }

    let questions = fetch_attempt_questions(&pool, &attempt).await?;
    let answer_keys: HashMap<i64, String> = questions
        .iter()
        .map(|q| (q.id, q.correct_answer.clone()))
        .collect();

    let grade = grade_submission(&attempt.questions.0, &answer_keys, &req.answers);

    let updated = sqlx::query_as::<_, TestAttempt>(&format!(
        "UPDATE test_attempts \
         SET questions = $1, \
             attempted_questions = $2, \
             correct_answers = $3, \
             score = $4, \
             time_taken_seconds = $5, \
             completed_at = now() \
         WHERE id = $6 AND completed_at IS NULL \
         RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(SqlJson(&grade.entries))
    .bind(grade.attempted)
    .bind(grade.correct)
    .bind(grade.score)
    .bind(req.time_taken_seconds)
    .bind(test_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store submission: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    // The row existed a moment ago, so zero rows means a racing submit won.
    .ok_or(AppError::Conflict(
        "Test attempt already submitted".to_string(),
    ))?;

    Ok(Json(updated))
}

/// Returns a completed attempt resolved for the results page: subject and
/// chapter names plus every question's text, options, answer key and notes
/// next to the recorded selection.
pub async fn get_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let attempt = fetch_owned_attempt(&pool, test_id, user_id).await?;

    let subject_name = sqlx::query_scalar::<_, String>("SELECT name FROM subjects WHERE id = $1")
        .bind(attempt.subject_id)
        .fetch_optional(&pool)
        .await?;

    let chapter_title = sqlx::query_scalar::<_, String>("SELECT title FROM chapters WHERE id = $1")
        .bind(attempt.chapter_id)
        .fetch_optional(&pool)
        .await?;

    let questions = fetch_attempt_questions(&pool, &attempt).await?;
    let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();

    let question_views: Vec<ResultQuestionView> = attempt
        .questions
        .0
        .iter()
        .map(|slot| ResultQuestionView {
            question: by_id.get(&slot.question_id).map(|q| (*q).clone()),
            selected_answer: slot.selected_answer.clone(),
            is_correct: slot.is_correct,
        })
        .collect();

    Ok(Json(TestResultsResponse {
        id: attempt.id,
        subject_name,
        chapter_title,
        page_number: attempt.page_number,
        questions: question_views,
        total_questions: attempt.total_questions,
        attempted_questions: attempt.attempted_questions,
        correct_answers: attempt.correct_answers,
        score: attempt.score,
        time_limit_minutes: attempt.time_limit_minutes,
        time_taken_seconds: attempt.time_taken_seconds,
        completed_at: attempt.completed_at,
    }))
}

/// Returns the caller's most recent completed attempts, newest first, with
/// subject and chapter names resolved for display.
pub async fn get_history(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let history = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT t.id,
               s.name AS subject_name,
               c.title AS chapter_title,
               t.page_number, t.total_questions, t.attempted_questions,
               t.correct_answers, t.score, t.time_limit_minutes,
               t.time_taken_seconds, t.completed_at
        FROM test_attempts t
        LEFT JOIN subjects s ON t.subject_id = s.id
        LEFT JOIN chapters c ON t.chapter_id = c.id
        WHERE t.user_id = $1 AND t.completed_at IS NOT NULL
        ORDER BY t.completed_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(HISTORY_LIMIT)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch test history: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(ids: &[i64]) -> Vec<AttemptQuestion> {
        ids.iter().map(|&id| AttemptQuestion::unanswered(id)).collect()
    }

    fn keys(pairs: &[(i64, &str)]) -> HashMap<i64, String> {
        pairs.iter().map(|&(id, k)| (id, k.to_string())).collect()
    }

    #[test]
    fn time_limit_is_two_minutes_per_question_rounded_up() {
        assert_eq!(time_limit_minutes(1), 1);
        assert_eq!(time_limit_minutes(2), 1);
        assert_eq!(time_limit_minutes(3), 2);
        assert_eq!(time_limit_minutes(4), 2);
        assert_eq!(time_limit_minutes(5), 3);
    }

    #[test]
    fn three_of_four_correct_scores_seventy_five() {
        let answer_keys = keys(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]);
        let submitted = keys(&[(1, "A"), (2, "B"), (3, "C"), (4, "A")]);

        let grade = grade_submission(&slots(&[1, 2, 3, 4]), &answer_keys, &submitted);

        assert_eq!(grade.attempted, 4);
        assert_eq!(grade.correct, 3);
        assert_eq!(grade.score, 75.0);
        assert_eq!(grade.entries[3].selected_answer.as_deref(), Some("A"));
        assert_eq!(grade.entries[3].is_correct, Some(false));
    }

    #[test]
    fn unanswered_slots_keep_both_fields_null() {
        let answer_keys = keys(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]);
        let submitted = keys(&[(1, "A"), (3, "A")]);

        let grade = grade_submission(&slots(&[1, 2, 3, 4]), &answer_keys, &submitted);

        assert_eq!(grade.attempted, 2);
        assert_eq!(grade.correct, 1);
        assert_eq!(grade.score, 25.0);
        assert!(grade.entries[1].selected_answer.is_none());
        assert!(grade.entries[1].is_correct.is_none());
        assert!(grade.entries[3].selected_answer.is_none());
        assert!(grade.entries[3].is_correct.is_none());
    }

    #[test]
    fn empty_submission_scores_zero_with_all_slots_null() {
        let answer_keys = keys(&[(1, "A"), (2, "B")]);
        let submitted = HashMap::new();

        let grade = grade_submission(&slots(&[1, 2]), &answer_keys, &submitted);

        assert_eq!(grade.attempted, 0);
        assert_eq!(grade.correct, 0);
        assert_eq!(grade.score, 0.0);
        assert!(grade.entries.iter().all(|e| e.is_correct.is_none()));
    }

    #[test]
    fn junk_answer_is_stored_but_grades_false() {
        let answer_keys = keys(&[(1, "A")]);
        let submitted = keys(&[(1, "Z")]);

        let grade = grade_submission(&slots(&[1]), &answer_keys, &submitted);

        assert_eq!(grade.attempted, 1);
        assert_eq!(grade.correct, 0);
        assert_eq!(grade.entries[0].selected_answer.as_deref(), Some("Z"));
        assert_eq!(grade.entries[0].is_correct, Some(false));
    }

    #[test]
    fn grading_is_case_sensitive() {
        let answer_keys = keys(&[(1, "A")]);
        let submitted = keys(&[(1, "a")]);

        let grade = grade_submission(&slots(&[1]), &answer_keys, &submitted);

        assert_eq!(grade.correct, 0);
        assert_eq!(grade.entries[0].is_correct, Some(false));
    }

    #[test]
    fn answer_for_a_vanished_question_grades_false() {
        // Question 2 was deleted between start and submit: the selection is
        // still recorded but cannot grade correct.
        let answer_keys = keys(&[(1, "A")]);
        let submitted = keys(&[(1, "A"), (2, "B")]);

        let grade = grade_submission(&slots(&[1, 2]), &answer_keys, &submitted);

        assert_eq!(grade.attempted, 2);
        assert_eq!(grade.correct, 1);
        assert_eq!(grade.entries[1].is_correct, Some(false));
    }

    #[test]
    fn score_uses_total_questions_as_denominator() {
        // 1 correct of 3 total (2 unanswered): 33.33..., not 100.
        let answer_keys = keys(&[(1, "A"), (2, "B"), (3, "C")]);
        let submitted = keys(&[(1, "A")]);

        let grade = grade_submission(&slots(&[1, 2, 3]), &answer_keys, &submitted);

        assert_eq!(grade.score, 100.0 / 3.0);
    }
}
