//! Wiring from configuration to running services.
//!
//! One `reqwest::Client` is built per external system and shared by every
//! adapter that talks to it.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::http::AppState;
use crate::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use crate::adapters::supabase::{
    MirroredProfileStore, SupabaseClient, SupabaseIdentityDirectory, SupabasePlanStore,
    SupabaseProfileStore,
};
use crate::application::{BillingPorts, BillingServices, SyncEngineConfig};
use crate::config::{AppConfig, StoreTarget};
use crate::domain::subscription::BillingError;
use crate::ports::ProfileStore;

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(20);

/// Builds the billing services, or explains what is missing.
pub fn build_services(config: &AppConfig) -> Result<BillingServices, BillingError> {
    let payment = config
        .payment
        .as_ref()
        .ok_or_else(|| BillingError::initialization("STRIPE_SECRET_KEY is not configured"))?;
    let store = config
        .store
        .as_ref()
        .ok_or_else(|| BillingError::initialization("SUPABASE_URL is not configured"))?;

    let stripe_config = StripeConfig::new(payment.secret_key.clone())
        .with_webhook_secret(payment.webhook_secret.clone())
        .with_base_url(payment.api_base.clone());
    let payments = Arc::new(StripePaymentAdapter::with_client(stripe_config, http_client()?));

    let primary = supabase_client(&store.primary, http_client()?);
    let primary_store: Arc<dyn ProfileStore> = Arc::new(SupabaseProfileStore::new(primary.clone()));
    let profiles: Arc<dyn ProfileStore> = match &store.mirror {
        Some(mirror) => {
            tracing::info!(mirror = %mirror.url, "Mirroring profile writes");
            let mirror_store = SupabaseProfileStore::new(supabase_client(mirror, http_client()?));
            Arc::new(MirroredProfileStore::new(primary_store, Arc::new(mirror_store)))
        }
        None => primary_store,
    };

    let ports = BillingPorts {
        payments,
        profiles,
        plans: Arc::new(SupabasePlanStore::new(primary.clone())),
        identity: Some(Arc::new(SupabaseIdentityDirectory::new(primary))),
        publishable_key: payment.publishable_key.clone(),
    };

    let sync_config = SyncEngineConfig::default().with_interval(config.sync.interval());
    Ok(BillingServices::new(ports, sync_config))
}

/// HTTP state for the configuration: ready when the services build,
/// degraded otherwise.
pub fn app_state(config: &AppConfig) -> AppState {
    let state = match build_services(config) {
        Ok(services) => AppState::ready(services),
        Err(e) => {
            tracing::warn!(error = %e, "Starting in degraded mode");
            AppState::degraded(e.to_string())
        }
    };
    state
        .with_missing_env(config.missing_required())
        .with_environment(config.server.environment.as_str())
}

fn supabase_client(target: &StoreTarget, http: reqwest::Client) -> SupabaseClient {
    SupabaseClient::with_client(target.url.clone(), target.admin_key.clone(), http)
}

fn http_client() -> Result<reqwest::Client, BillingError> {
    reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .build()
        .map_err(|e| BillingError::initialization(format!("HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_map(vars).unwrap()
    }

    #[test]
    fn missing_stripe_key_degrades() {
        let state = app_state(&config(&[
            ("SUPABASE_URL", "https://db.example.co"),
            ("SUPABASE_SECRET_KEY", "secret"),
        ]));
        assert!(!state.is_ready());
        assert!(state.missing_env().contains(&"STRIPE_SECRET_KEY"));
    }

    #[test]
    fn complete_config_is_ready() {
        let state = app_state(&config(&[
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
            ("SUPABASE_URL", "https://db.example.co"),
            ("SUPABASE_SECRET_KEY", "secret"),
            ("WIZNOTE_SUPABASE_URL", "https://mirror.example.co"),
            ("WIZNOTE_SUPABASE_SECRET_KEY", "mirror-secret"),
        ]));
        assert!(state.is_ready());
        assert!(state.missing_env().is_empty());
    }
}
