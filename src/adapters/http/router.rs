//! Top-level router and shared middleware.

use std::future::{ready, Ready};
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::billing::billing_routes;
use super::error::{method_not_allowed, ErrorResponse};
use super::ops::ops_routes;
use super::state::AppState;
use crate::config::ServerConfig;

/// Method fallback for a route: 405 naming the verbs it accepts.
pub fn only(allowed: &'static str) -> impl Fn() -> Ready<Response> + Clone + Send + Sync + 'static {
    move || ready(method_not_allowed(allowed))
}

/// Build the complete application router.
///
/// Layers, outermost first: CORS (answers preflight for every path), request
/// tracing, request timeout.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .merge(ops_routes())
        .nest("/api/stripe", billing_routes())
        .fallback(unmatched)
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(server))
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("stripe-signature"),
        ]);

    if !server.is_production() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// 301 to the collapsed path for `/api` paths with repeated slashes,
/// otherwise 404.
async fn unmatched(uri: Uri) -> Response {
    let path = uri.path();
    if path.starts_with("/api") && path.contains("//") {
        let mut location = collapse_slashes(path);
        if let Some(query) = uri.query() {
            location.push('?');
            location.push_str(query);
        }
        tracing::debug!(from = %path, to = %location, "Redirecting duplicate slashes");
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
    }

    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::with_details("Not found", path.to_string())),
    )
        .into_response()
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}
