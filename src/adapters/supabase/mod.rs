//! Supabase adapters.
//!
//! - `SupabaseProfileStore` - `user_profiles` over PostgREST
//! - `SupabasePlanStore` - `premium_plans` over PostgREST
//! - `SupabaseIdentityDirectory` - Auth admin user list
//! - `MirroredProfileStore` - primary store with a best-effort mirror

mod client;
mod identity_directory;
mod mirrored_store;
mod plan_store;
mod profile_store;

pub use client::SupabaseClient;
pub use identity_directory::SupabaseIdentityDirectory;
pub use mirrored_store::MirroredProfileStore;
pub use plan_store::SupabasePlanStore;
pub use profile_store::SupabaseProfileStore;
