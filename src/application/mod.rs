//! Application layer - the three drivers and their shared write path.
//!
//! - `handlers` - synchronous flows and the webhook driver
//! - `sync` - the periodic reconciliation driver
//! - `reconciler` - read, project, write-if-needed; used by every driver
//! - `services` - ports wired into handlers and the sync engine

pub mod handlers;
pub mod reconciler;
pub mod services;
pub mod sync;

pub use reconciler::{ProfileTarget, ReconcileOutcome, Reconciler};
pub use services::{BillingPorts, BillingServices};
pub use sync::{SyncEngine, SyncEngineConfig, SyncReport, SyncRun, SyncStatus};
