//! In-memory adapters for tests and local development.
//!
//! - `InMemoryProfileStore` - profile rows with a write counter
//! - `InMemoryPlanStore` - plan rows
//! - `InMemoryIdentityDirectory` - email to user id map

mod catalog;
mod profile_store;

pub use catalog::{InMemoryIdentityDirectory, InMemoryPlanStore};
pub use profile_store::InMemoryProfileStore;
