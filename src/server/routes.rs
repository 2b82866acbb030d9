//! Router configuration for the API server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        // Provider intake
        .route("/webhook/incoming_message", post(handlers::incoming_message))
        .route("/webhooks/gumroad", post(handlers::gumroad))
        // Cron entry points
        .route("/tasks/plan_rollover", post(handlers::plan_rollover))
        .route("/jobs/reengage", post(handlers::trigger_reengage))
        // Operational probes
        .route("/debug/env", get(handlers::debug_env))
        .route("/debug/queue", get(handlers::debug_queue))
        .route("/debug/enqueue-ping", get(handlers::enqueue_ping))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
