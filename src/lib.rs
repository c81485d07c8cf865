//! Subscription Guardian - Stripe subscription state reconciliation.
//!
//! Keeps the `premium` record on each user profile consistent with Stripe.
//! Three drivers feed one pure projector: verified webhooks, synchronous
//! billing flows behind the HTTP API, and a periodic background sync.

pub mod adapters;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod ports;
