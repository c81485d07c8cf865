//! HTTP adapters - REST API implementations.
//!
//! - `billing` - Stripe billing flows under `/api/stripe`
//! - `ops` - service info, health, readiness and sync control
//! - `router` - composes both with CORS, tracing and timeouts

pub mod billing;
pub mod error;
pub mod ops;
pub mod router;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use router::router;
pub use state::AppState;
