//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `stripe` - Stripe REST adapter and a stateful mock
//! - `supabase` - PostgREST profile and plan stores, Auth admin directory
//! - `memory` - In-memory stores for tests and local development
//! - `http` - Axum REST surface

pub mod http;
pub mod memory;
pub mod stripe;
pub mod supabase;
