//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, timestamps, validation errors)
//! - `subscription` - Subscription state, the projector, plans and coupons

pub mod foundation;
pub mod subscription;
