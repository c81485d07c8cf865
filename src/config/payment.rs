//! Payment configuration

use secrecy::{ExposeSecret, SecretString};

use super::error::ValidationError;

/// Default Stripe API base URL.
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Payment configuration (Stripe)
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub secret_key: SecretString,

    /// Stripe webhook signing secret
    pub webhook_secret: Option<SecretString>,

    /// Publishable key echoed to mobile clients
    pub publishable_key: Option<String>,

    /// API base URL, overridable for tests
    pub api_base: String,
}

impl PaymentConfig {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            secret_key,
            webhook_secret: None,
            publishable_key: None,
            api_base: DEFAULT_STRIPE_API_BASE.to_string(),
        }
    }

    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.expose_secret().contains("_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.secret_key.expose_secret().contains("_live_")
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let key = self.secret_key.expose_secret();
        if key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_SECRET_KEY"));
        }

        // Restricted keys (rk_) are accepted alongside secret keys
        if !key.starts_with("sk_") && !key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }

        match &self.webhook_secret {
            None => return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET")),
            Some(secret) if !secret.expose_secret().starts_with("whsec_") => {
                return Err(ValidationError::InvalidStripeWebhookSecret)
            }
            Some(_) => {}
        }

        if let Some(publishable) = &self.publishable_key {
            if !publishable.starts_with("pk_") {
                return Err(ValidationError::InvalidPublishableKey);
            }
        }

        if !is_http_url(&self.api_base) {
            return Err(ValidationError::InvalidUrl("STRIPE_API_BASE"));
        }

        Ok(())
    }
}

pub(super) fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str, webhook: Option<&str>) -> PaymentConfig {
        PaymentConfig {
            webhook_secret: webhook.map(|s| SecretString::new(s.to_string())),
            ..PaymentConfig::new(SecretString::new(key.to_string()))
        }
    }

    #[test]
    fn test_is_test_mode() {
        let config = config("sk_test_xxx", Some("whsec_xxx"));
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());
    }

    #[test]
    fn test_is_live_mode() {
        let config = config("sk_live_xxx", Some("whsec_xxx"));
        assert!(config.is_live_mode());
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_validation_missing_webhook_secret() {
        assert_eq!(
            config("sk_test_xxx", None).validate(),
            Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"))
        );
    }

    #[test]
    fn test_validation_invalid_api_key_prefix() {
        assert_eq!(
            config("pk_test_xxx", Some("whsec_xxx")).validate(),
            Err(ValidationError::InvalidStripeKey)
        );
    }

    #[test]
    fn test_validation_restricted_key_accepted() {
        assert!(config("rk_live_xxx", Some("whsec_xxx")).validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_webhook_secret_prefix() {
        assert_eq!(
            config("sk_test_xxx", Some("secret_xxx")).validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        );
    }

    #[test]
    fn test_validation_invalid_publishable_key() {
        let mut config = config("sk_test_xxx", Some("whsec_xxx"));
        config.publishable_key = Some("sk_test_oops".to_string());
        assert_eq!(config.validate(), Err(ValidationError::InvalidPublishableKey));
    }

    #[test]
    fn test_validation_valid_config() {
        let mut config = config("sk_test_abcd1234", Some("whsec_xyz789"));
        config.publishable_key = Some("pk_test_123".to_string());
        assert!(config.validate().is_ok());
    }
}
