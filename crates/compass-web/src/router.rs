//! Axum router: maps all URL paths to handlers.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{admin, health, overrides, query, questions, statistics, users};
use crate::rate_limit::ai_rate_limit;
use crate::sse::statistics_events;
use crate::state::SharedState;

/// Build and return the full Axum router.
pub fn build_router(state: SharedState) -> Router {
    // Routes that call an LLM count against the caller's AI budget.
    let ai_routes = Router::new()
        .route("/api/query/generate", post(query::generate))
        .route("/api/query/process",  post(query::process))
        .route_layer(middleware::from_fn_with_state(state.clone(), ai_rate_limit));

    Router::new()
        .route("/api/health", get(health::health))

        // Statistics
        .route("/api/statistics/update",          post(statistics::update))
        .route("/api/statistics/update/empire",   post(statistics::update_empire))
        .route("/api/statistics/update/nlp4re",   post(statistics::update_nlp4re))
        .route("/api/statistics/progress/{template}", get(statistics::progress))
        .route("/api/statistics/events",          get(statistics_events))

        // Query pipeline
        .route("/api/query/execute",  post(query::execute))
        .merge(ai_routes)

        // Dynamic questions
        .route("/api/dynamic-questions",        get(questions::list).post(questions::save))
        .route("/api/dynamic-questions/import", post(questions::import))
        .route("/api/dynamic-questions/{id}",   get(questions::get).delete(questions::delete))
        .route("/api/community-questions",      get(questions::list_community))

        // Question overrides
        .route("/api/overrides/{uid}",                   get(overrides::get).post(overrides::save))
        .route("/api/overrides/{uid}/restore/{version}", post(overrides::restore))

        // Users
        .route("/api/users/sync", post(users::sync))
        .route("/api/users/{id}", get(users::get))

        // Admin
        .route("/api/request-logs", get(admin::request_logs))
        .route("/api/llm/calls",    get(admin::llm_calls))
        .route("/api/backup",       post(admin::backup))
        .route("/api/restore",      post(admin::restore))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
