// tests/test_flow_tests.rs

use mcq_backend::{config::Config, routes, state::AppState};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

async fn spawn_app() -> Option<(String, PgPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_flow_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((address, pool))
}

async fn register_and_login(client: &reqwest::Client, address: &str) -> String {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Register failed");

    let resp = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    resp["token"].as_str().expect("Token not found").to_string()
}

#[derive(serde::Serialize)]
struct SeedOptions {
    #[serde(rename = "A")]
    a: &'static str,
    #[serde(rename = "B")]
    b: &'static str,
    #[serde(rename = "C")]
    c: &'static str,
    #[serde(rename = "D")]
    d: &'static str,
}

/// Seeds a subject, one chapter, and questions on page 1 with the given
/// correct answers. Returns (chapter_id, question_ids).
async fn seed_page(pool: &PgPool, correct_answers: &[&str]) -> (i64, Vec<i64>) {
    let subject_name = format!("Subject {}", uuid::Uuid::new_v4());
    let subject_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO subjects (name) VALUES ($1) RETURNING id",
    )
    .bind(&subject_name)
    .fetch_one(pool)
    .await
    .unwrap();

    let chapter_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO chapters (subject_id, title, total_pages) VALUES ($1, 'Chapter One', 1) RETURNING id",
    )
    .bind(subject_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let mut question_ids = Vec::new();
    for (i, answer) in correct_answers.iter().enumerate() {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO questions
            (subject_id, chapter_id, page_number, question_text, options, correct_answer)
            VALUES ($1, $2, 1, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(subject_id)
        .bind(chapter_id)
        .bind(format!("Question {}", i + 1))
        .bind(Json(SeedOptions {
            a: "alpha",
            b: "bravo",
            c: "charlie",
            d: "delta",
        }))
        .bind(answer)
        .fetch_one(pool)
        .await
        .unwrap();
        question_ids.push(id);
    }

    (chapter_id, question_ids)
}

/// Builds the `answers` map of a submit payload from (question id, letter)
/// pairs.
fn answers(pairs: &[(i64, &str)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = pairs
        .iter()
        .map(|(id, letter)| (id.to_string(), serde_json::Value::from(*letter)))
        .collect();
    serde_json::Value::Object(map)
}

async fn start_test(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    chapter_id: i64,
) -> serde_json::Value {
    let resp = client
        .post(format!("{}/api/tests/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"chapterId": chapter_id, "pageNumber": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn start_builds_a_fresh_attempt() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, question_ids) = seed_page(&pool, &["A", "B", "C"]).await;

    let attempt = start_test(&client, &address, &token, chapter_id).await;

    // 3 questions: ceil(3 / 2) = 2 minutes
    assert_eq!(attempt["timeLimitMinutes"], 2);
    assert_eq!(attempt["totalQuestions"], 3);
    assert_eq!(attempt["attemptedQuestions"], 0);
    assert_eq!(attempt["score"], 0.0);
    assert!(attempt["completedAt"].is_null());

    let questions = attempt["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    for (slot, qid) in questions.iter().zip(&question_ids) {
        assert_eq!(slot["question"]["id"].as_i64(), Some(*qid));
        assert!(slot["selectedAnswer"].is_null());
        assert!(slot["isCorrect"].is_null());
        // The answer key must not leak to the test taker
        assert!(slot["question"].get("correctAnswer").is_none());
    }

    // The in-progress attempt can be fetched for rendering
    let test_id = attempt["id"].as_i64().unwrap();
    let fetched: serde_json::Value = client
        .get(format!("{}/api/tests/{}", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"].as_i64(), Some(test_id));
    assert_eq!(fetched["questions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn start_with_no_questions_is_not_found() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, _) = seed_page(&pool, &["A"]).await;

    // Page 2 has no questions
    let resp = client
        .post(format!("{}/api/tests/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"chapterId": chapter_id, "pageNumber": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn submit_grades_and_locks_the_attempt() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, qids) = seed_page(&pool, &["A", "B", "C", "D"]).await;
    let attempt = start_test(&client, &address, &token, chapter_id).await;
    let test_id = attempt["id"].as_i64().unwrap();

    // A stranger must not be able to submit someone else's attempt
    let stranger = register_and_login(&client, &address).await;
    let resp = client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", stranger))
        .json(&serde_json::json!({"answers": answers(&[(qids[0], "A")])}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // 3 correct, 1 wrong
    let submitted = answers(&[
        (qids[0], "A"),
        (qids[1], "B"),
        (qids[2], "C"),
        (qids[3], "A"),
    ]);
    let resp = client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": submitted, "timeTakenSeconds": 95}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let graded: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(graded["attemptedQuestions"], 4);
    assert_eq!(graded["correctAnswers"], 3);
    assert_eq!(graded["score"], 75.0);
    assert_eq!(graded["timeTakenSeconds"], 95);
    assert!(!graded["completedAt"].is_null());

    let slots = graded["questions"].as_array().unwrap();
    assert_eq!(slots[3]["selectedAnswer"], "A");
    assert_eq!(slots[3]["isCorrect"], false);

    // Submitting a completed attempt is rejected
    let resp = client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    // Unknown attempt id
    let resp = client
        .post(format!("{}/api/tests/999999999/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn partial_submission_leaves_unanswered_slots_null() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, qids) = seed_page(&pool, &["A", "B", "C", "D"]).await;
    let attempt = start_test(&client, &address, &token, chapter_id).await;
    let test_id = attempt["id"].as_i64().unwrap();

    // Answer only the first two questions, one correctly
    let submitted = answers(&[(qids[0], "A"), (qids[1], "D")]);
    let graded: serde_json::Value = client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": submitted}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(graded["attemptedQuestions"], 2);
    assert_eq!(graded["correctAnswers"], 1);
    assert_eq!(graded["score"], 25.0);

    let slots = graded["questions"].as_array().unwrap();
    assert!(slots[2]["selectedAnswer"].is_null());
    assert!(slots[2]["isCorrect"].is_null());
    assert!(slots[3]["selectedAnswer"].is_null());
    assert!(slots[3]["isCorrect"].is_null());
}

#[tokio::test]
async fn results_resolve_names_and_answer_keys() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, qids) = seed_page(&pool, &["B", "C"]).await;
    let attempt = start_test(&client, &address, &token, chapter_id).await;
    let test_id = attempt["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": answers(&[(qids[0], "B"), (qids[1], "A")])}))
        .send()
        .await
        .unwrap();

    let results: serde_json::Value = client
        .get(format!("{}/api/tests/results/{}", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(results["chapterTitle"], "Chapter One");
    assert!(results["subjectName"].as_str().unwrap().starts_with("Subject "));
    assert_eq!(results["score"], 50.0);

    let slots = results["questions"].as_array().unwrap();
    // Results show the answer key for review
    assert_eq!(slots[0]["question"]["correctAnswer"], "B");
    assert_eq!(slots[0]["isCorrect"], true);
    assert_eq!(slots[1]["question"]["correctAnswer"], "C");
    assert_eq!(slots[1]["selectedAnswer"], "A");
    assert_eq!(slots[1]["isCorrect"], false);

    // Results are private to the attempt owner
    let stranger = register_and_login(&client, &address).await;
    let resp = client
        .get(format!("{}/api/tests/results/{}", address, test_id))
        .header("Authorization", format!("Bearer {}", stranger))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn history_returns_ten_newest_completed_attempts() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, qids) = seed_page(&pool, &["A"]).await;

    // 11 completed attempts plus one left in progress
    let mut last_completed_id = 0;
    for _ in 0..11 {
        let attempt = start_test(&client, &address, &token, chapter_id).await;
        let test_id = attempt["id"].as_i64().unwrap();
        client
            .post(format!("{}/api/tests/{}/submit", address, test_id))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({"answers": answers(&[(qids[0], "A")])}))
            .send()
            .await
            .unwrap();
        last_completed_id = test_id;
    }
    start_test(&client, &address, &token, chapter_id).await;

    let history: serde_json::Value = client
        .get(format!("{}/api/tests/history", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 10);
    // Newest first, and the in-progress attempt is absent
    assert_eq!(entries[0]["id"].as_i64(), Some(last_completed_id));
    assert!(entries.iter().all(|e| !e["completedAt"].is_null()));
    assert_eq!(entries[0]["chapterTitle"], "Chapter One");
    // History is totals only
    assert!(entries[0].get("questions").is_none());
}

#[tokio::test]
async fn chapter_progress_tracks_passing_attempts() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let (chapter_id, qids) = seed_page(&pool, &["A", "B", "C", "D"]).await;

    let progress_url = format!("{}/api/chapters/{}/progress", address, chapter_id);

    // No attempts yet
    let body: serde_json::Value = client
        .get(&progress_url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["progress"], 0);

    // A failing attempt (2 of 4 = 50%) does not move progress
    let attempt = start_test(&client, &address, &token, chapter_id).await;
    let test_id = attempt["id"].as_i64().unwrap();
    client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": answers(&[
            (qids[0], "A"),
            (qids[1], "B"),
            (qids[2], "A"),
            (qids[3], "A"),
        ])}))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client
        .get(&progress_url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["progress"], 0);

    // A passing attempt (3 of 4 = 75%) covers all four questions
    let attempt = start_test(&client, &address, &token, chapter_id).await;
    let test_id = attempt["id"].as_i64().unwrap();
    client
        .post(format!("{}/api/tests/{}/submit", address, test_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"answers": answers(&[
            (qids[0], "A"),
            (qids[1], "B"),
            (qids[2], "C"),
            (qids[3], "A"),
        ])}))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client
        .get(&progress_url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["progress"], 100);

    // Progress is per-user: a fresh account starts at zero
    let stranger = register_and_login(&client, &address).await;
    let body: serde_json::Value = client
        .get(&progress_url)
        .header("Authorization", format!("Bearer {}", stranger))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["progress"], 0);

    // Missing chapter
    let resp = client
        .get(format!("{}/api/chapters/999999999/progress", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
