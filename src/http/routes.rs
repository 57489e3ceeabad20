use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Device sessions
        .route("/devices", get(handlers::list_devices))
        .route("/devices/:device_id", delete(handlers::disconnect_device))
        .route("/devices/:device_id/inject", post(handlers::inject_message))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
