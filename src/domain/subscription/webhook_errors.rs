//! Webhook verification errors.
//!
//! Every verification failure answers 400 so Stripe stops retrying a
//! delivery that can never verify.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur while authenticating a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// The `Stripe-Signature` header was absent.
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the replay window (5 minutes).
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse the payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No webhook signing secret is configured.
    #[error("Webhook secret not configured")]
    NotConfigured,
}

impl WebhookError {
    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signature_displays_correctly() {
        assert_eq!(WebhookError::InvalidSignature.to_string(), "Invalid signature");
    }

    #[test]
    fn parse_error_displays_message() {
        let err = WebhookError::ParseError("invalid JSON".to_string());
        assert_eq!(err.to_string(), "Parse error: invalid JSON");
    }

    #[test]
    fn verification_failures_return_bad_request() {
        for err in [
            WebhookError::MissingSignature,
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
            WebhookError::InvalidTimestamp,
            WebhookError::ParseError("x".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{}", err);
        }
    }

    #[test]
    fn missing_secret_is_unavailable() {
        assert_eq!(
            WebhookError::NotConfigured.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
