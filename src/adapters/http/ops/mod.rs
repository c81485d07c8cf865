//! HTTP adapter for health, readiness and sync control.

pub mod handlers;
pub mod routes;

pub use routes::ops_routes;
