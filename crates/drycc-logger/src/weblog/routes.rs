//! Route configuration for the HTTP read API.

use std::sync::Arc;

use axum::routing::{get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{delete_logs, get_logs, healthz};
use super::WeblogState;

/// Create the HTTP API router.
pub fn create_router(state: Arc<WeblogState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/logs/{app}", get(get_logs).delete(delete_logs))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
