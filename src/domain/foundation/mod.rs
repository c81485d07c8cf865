//! Foundation module - Shared domain primitives.
//!
//! Identifiers, instants and validation errors used across the billing domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::ValidationError;
pub use ids::UserId;
pub use timestamp::Timestamp;
