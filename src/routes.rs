// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, chapter, question, subject},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, subjects, chapters, questions, tests, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let subject_routes = Router::new()
        .route("/", get(subject::list_subjects))
        .route("/{id}", get(subject::get_subject));

    let chapter_routes = Router::new()
        .route("/subject/{subject_id}", get(chapter::list_chapters))
        .route("/{id}", get(chapter::get_chapter))
        // Progress is per-user, so it sits behind authentication
        .merge(
            Router::new()
                .route("/{id}/progress", get(chapter::chapter_progress))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let question_routes = Router::new()
        .route(
            "/{chapter_id}/{page_number}",
            get(question::list_page_questions),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let test_routes = Router::new()
        .route("/start", post(attempt::start_test))
        .route("/history", get(attempt::get_history))
        .route("/results/{test_id}", get(attempt::get_results))
        .route("/{test_id}", get(attempt::get_test))
        .route("/{test_id}/submit", post(attempt::submit_test))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/subjects", post(admin::create_subject))
        .route(
            "/subjects/{id}",
            patch(admin::update_subject).delete(admin::delete_subject),
        )
        .route("/chapters", post(admin::create_chapter))
        .route(
            "/chapters/{id}",
            patch(admin::update_chapter).delete(admin::delete_chapter),
        )
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/upload", post(admin::upload_content))
        .route("/stats", get(admin::get_stats))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/subjects", subject_routes)
        .nest("/api/chapters", chapter_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/tests", test_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
