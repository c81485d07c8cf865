//! Shared HTTP state.
//!
//! The server starts even when Stripe or Supabase configuration is missing.
//! In that case the state is degraded: dependent endpoints answer 503 and
//! readiness reports the reason.

use std::sync::Arc;

use crate::application::BillingServices;
use crate::domain::subscription::BillingError;

#[derive(Clone)]
enum ServiceSlot {
    Ready(BillingServices),
    Degraded(String),
}

/// Application state cloned into every request.
#[derive(Clone)]
pub struct AppState {
    slot: ServiceSlot,
    missing_env: Arc<Vec<&'static str>>,
    environment: &'static str,
}

impl AppState {
    pub fn ready(services: BillingServices) -> Self {
        Self {
            slot: ServiceSlot::Ready(services),
            missing_env: Arc::new(Vec::new()),
            environment: "development",
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            slot: ServiceSlot::Degraded(reason.into()),
            missing_env: Arc::new(Vec::new()),
            environment: "development",
        }
    }

    /// Records required variables that are absent, for readiness.
    pub fn with_missing_env(mut self, missing: Vec<&'static str>) -> Self {
        self.missing_env = Arc::new(missing);
        self
    }

    pub fn with_environment(mut self, environment: &'static str) -> Self {
        self.environment = environment;
        self
    }

    /// The wired services, or an initialization error naming what is missing.
    pub fn services(&self) -> Result<&BillingServices, BillingError> {
        match &self.slot {
            ServiceSlot::Ready(services) => Ok(services),
            ServiceSlot::Degraded(reason) => Err(BillingError::initialization(reason.clone())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot, ServiceSlot::Ready(_))
    }

    pub fn missing_env(&self) -> &[&'static str] {
        &self.missing_env
    }

    pub fn environment(&self) -> &'static str {
        self.environment
    }
}
