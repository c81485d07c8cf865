//! Application configuration module
//!
//! Configuration is read from the process environment using the `config` and
//! `dotenvy` crates. Variable names are used as-is, without a prefix, so the
//! service reads the same `STRIPE_*` / `SUPABASE_*` variables as its
//! deployment platform provides.
//!
//! Missing Stripe or Supabase settings are not a load error: the matching
//! section is `None` and the HTTP surface starts degraded. `validate` and the
//! `check-config` command report them.
//!
//! # Example
//!
//! ```no_run
//! use subscription_guardian::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! if let Err(e) = config.validate() {
//!     eprintln!("configuration problem: {}", e);
//! }
//! ```

mod error;
mod payment;
mod server;
mod store;
mod sync;

pub use error::{ConfigError, ValidationError};
pub use payment::{PaymentConfig, DEFAULT_STRIPE_API_BASE};
pub use server::{Environment, ServerConfig};
pub use store::{ProfileStoreConfig, StoreTarget};
pub use sync::SyncConfig;

use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;

/// Environment variables as read, before typing.
///
/// `config::Environment` lowercases keys, hence the field names.
#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    host: Option<String>,
    port: Option<String>,
    node_env: Option<String>,
    log_level: Option<String>,
    request_timeout_secs: Option<String>,
    cors_allowed_origins: Option<String>,

    stripe_secret_key: Option<String>,
    stripe_webhook_secret: Option<String>,
    stripe_publishable_key: Option<String>,
    stripe_api_base: Option<String>,

    supabase_url: Option<String>,
    supabase_secret_key: Option<String>,
    supabase_service_role_key: Option<String>,

    wiznote_supabase_url: Option<String>,
    wiznote_supabase_secret_key: Option<String>,
    wiznote_supabase_service_key: Option<String>,

    sync_enabled: Option<String>,
    sync_interval_minutes: Option<String>,
}

/// Root application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,

    /// `None` when `STRIPE_SECRET_KEY` is missing
    pub payment: Option<PaymentConfig>,

    /// `None` when the primary Supabase URL or admin key is missing
    pub store: Option<ProfileStoreConfig>,

    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    ///
    /// Loads `.env` first when present (development).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(config::Environment::default())
    }

    /// Load configuration from an explicit variable map.
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::default().source(Some(vars)))
    }

    fn from_environment(source: config::Environment) -> Result<Self, ConfigError> {
        let raw: RawEnv = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnv) -> Result<Self, ConfigError> {
        let server = ServerConfig {
            host: non_empty(raw.host).unwrap_or_else(server::default_host),
            port: parse_or("PORT", raw.port, server::default_port())?,
            environment: Environment::parse(raw.node_env.as_deref()),
            log_level: non_empty(raw.log_level),
            request_timeout_secs: parse_or(
                "REQUEST_TIMEOUT_SECS",
                raw.request_timeout_secs,
                server::default_request_timeout(),
            )?,
            cors_origins: non_empty(raw.cors_allowed_origins),
        };

        let payment = non_empty(raw.stripe_secret_key).map(|key| PaymentConfig {
            webhook_secret: non_empty(raw.stripe_webhook_secret).map(SecretString::new),
            publishable_key: non_empty(raw.stripe_publishable_key),
            api_base: non_empty(raw.stripe_api_base)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            ..PaymentConfig::new(SecretString::new(key))
        });

        let primary = target(
            raw.supabase_url,
            store::first_key(&[
                raw.supabase_secret_key.as_ref(),
                raw.supabase_service_role_key.as_ref(),
            ]),
        );
        let mirror = target(
            raw.wiznote_supabase_url,
            store::first_key(&[
                raw.wiznote_supabase_secret_key.as_ref(),
                raw.wiznote_supabase_service_key.as_ref(),
            ]),
        );
        let store = primary.map(|primary| ProfileStoreConfig { primary, mirror });

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            enabled: parse_bool("SYNC_ENABLED", raw.sync_enabled, defaults.enabled)?,
            interval_minutes: parse_or(
                "SYNC_INTERVAL_MINUTES",
                raw.sync_interval_minutes,
                defaults.interval_minutes,
            )?,
        };

        Ok(Self {
            server,
            payment,
            store,
            sync,
        })
    }

    /// Names of required variables that are not set.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &self.payment {
            None => {
                missing.push("STRIPE_SECRET_KEY");
                missing.push("STRIPE_WEBHOOK_SECRET");
            }
            Some(payment) if payment.webhook_secret.is_none() => {
                missing.push("STRIPE_WEBHOOK_SECRET")
            }
            Some(_) => {}
        }
        if self.store.is_none() {
            missing.push("SUPABASE_URL");
            missing.push("SUPABASE_SECRET_KEY");
        }
        missing
    }

    /// Validate all configuration values
    ///
    /// Reports the first problem found, including missing sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.sync.validate()?;
        match &self.payment {
            Some(payment) => payment.validate()?,
            None => return Err(ValidationError::MissingRequired("STRIPE_SECRET_KEY")),
        }
        match &self.store {
            Some(store) => store.validate()?,
            None => return Err(ValidationError::MissingRequired("SUPABASE_URL")),
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn target(url: Option<String>, admin_key: Option<SecretString>) -> Option<StoreTarget> {
    Some(StoreTarget {
        url: non_empty(url)?.trim_end_matches('/').to_string(),
        admin_key: admin_key?,
    })
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match non_empty(value) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue { name, value: v }),
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match non_empty(value).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value: v }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("STRIPE_SECRET_KEY", "sk_test_abc"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
            ("STRIPE_PUBLISHABLE_KEY", "pk_test_abc"),
            ("SUPABASE_URL", "https://primary.supabase.co/"),
            ("SUPABASE_SERVICE_ROLE_KEY", "legacy-key"),
            ("SUPABASE_SECRET_KEY", "sb_secret_new"),
        ]
    }

    #[test]
    fn test_load_full_environment() {
        let config = AppConfig::from_map(vars(&full_env())).unwrap();

        assert!(config.validate().is_ok());
        assert!(config.missing_required().is_empty());
        let store = config.store.unwrap();
        assert_eq!(store.primary.url, "https://primary.supabase.co");
        assert_eq!(store.primary.admin_key.expose_secret(), "sb_secret_new");
        assert!(store.mirror.is_none());
        let payment = config.payment.unwrap();
        assert_eq!(payment.api_base, DEFAULT_STRIPE_API_BASE);
        assert_eq!(payment.publishable_key.as_deref(), Some("pk_test_abc"));
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = AppConfig::from_map(HashMap::new()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert!(config.payment.is_none());
        assert!(config.store.is_none());
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("STRIPE_SECRET_KEY"))
        );
        assert_eq!(
            config.missing_required(),
            vec![
                "STRIPE_SECRET_KEY",
                "STRIPE_WEBHOOK_SECRET",
                "SUPABASE_URL",
                "SUPABASE_SECRET_KEY"
            ]
        );
    }

    #[test]
    fn test_mirror_uses_legacy_key_fallback() {
        let mut env = full_env();
        env.push(("WIZNOTE_SUPABASE_URL", "https://mirror.supabase.co"));
        env.push(("WIZNOTE_SUPABASE_SERVICE_KEY", "mirror-legacy"));

        let config = AppConfig::from_map(vars(&env)).unwrap();
        let mirror = config.store.unwrap().mirror.unwrap();
        assert_eq!(mirror.url, "https://mirror.supabase.co");
        assert_eq!(mirror.admin_key.expose_secret(), "mirror-legacy");
    }

    #[test]
    fn test_mirror_without_key_is_ignored() {
        let mut env = full_env();
        env.push(("WIZNOTE_SUPABASE_URL", "https://mirror.supabase.co"));

        let config = AppConfig::from_map(vars(&env)).unwrap();
        assert!(config.store.unwrap().mirror.is_none());
    }

    #[test]
    fn test_server_and_sync_overrides() {
        let mut env = full_env();
        env.extend([
            ("PORT", "3000"),
            ("NODE_ENV", "production"),
            ("CORS_ALLOWED_ORIGINS", "https://app.example.com"),
            ("SYNC_ENABLED", "false"),
            ("SYNC_INTERVAL_MINUTES", "15"),
            ("STRIPE_API_BASE", "http://localhost:12111/"),
        ]);

        let config = AppConfig::from_map(vars(&env)).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert_eq!(config.server.cors_origins_list(), vec!["https://app.example.com"]);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.interval_minutes, 15);
        assert_eq!(config.payment.unwrap().api_base, "http://localhost:12111");
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = AppConfig::from_map(vars(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));
    }

    #[test]
    fn test_missing_webhook_secret_is_reported() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "STRIPE_WEBHOOK_SECRET")
            .collect();
        let config = AppConfig::from_map(vars(&env)).unwrap();
        assert_eq!(config.missing_required(), vec!["STRIPE_WEBHOOK_SECRET"]);
        assert!(config.validate().is_err());
    }
}
