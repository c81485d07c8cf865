//! Axum router configuration for the ops endpoints.

use axum::{routing::get, Router};

use super::handlers::{health, ready, service_info, sync_status, trigger_sync};
use crate::adapters::http::router::only;
use crate::adapters::http::state::AppState;

/// Create the ops router, mounted at the root.
///
/// # Routes
/// - `GET /` - Service info
/// - `GET /api/health` - Liveness
/// - `GET /api/ready` - Readiness probes
/// - `GET /api/sync-status` - Periodic sync status
/// - `POST /api/sync-status` - Schedule a sync run
pub fn ops_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info).fallback(only("GET")))
        .route("/api/health", get(health).fallback(only("GET")))
        .route("/api/ready", get(ready).fallback(only("GET")))
        .route(
            "/api/sync-status",
            get(sync_status).post(trigger_sync).fallback(only("GET, POST")),
        )
}
