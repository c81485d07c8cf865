//! Billing error taxonomy.
//!
//! Every adapter failure is converted into one of these kinds at the seam,
//! and the HTTP layer maps them to responses exactly once.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | PaymentRejected | 400 |
//! | BadSignature | 400 |
//! | NotFound | 404 |
//! | Conflict | 409 |
//! | DuplicateCode | 409 |
//! | Upstream | 500 |
//! | Initialization | 503 |

use thiserror::Error;

use super::status::SubscriptionStatus;
use crate::domain::foundation::ValidationError;

/// Which double-subscription guard tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The user already has an entitled subscription.
    AlreadyActive,
    /// The user has a subscription waiting on payment.
    Pending,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::AlreadyActive => "already-active",
            ConflictKind::Pending => "pending",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConflictKind::AlreadyActive => "User already has an active subscription",
            ConflictKind::Pending => "User has a pending subscription awaiting payment",
        }
    }

    /// Classifies an existing subscription's status.
    pub fn for_status(status: SubscriptionStatus) -> Self {
        if status.is_entitled() {
            ConflictKind::AlreadyActive
        } else {
            ConflictKind::Pending
        }
    }
}

/// Errors surfaced by billing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("{resource} not found")]
    NotFound { resource: String, id: String },

    #[error("{}", kind.message())]
    Conflict {
        kind: ConflictKind,
        subscription_id: String,
        status: SubscriptionStatus,
    },

    #[error("Duplicate code: {0}")]
    DuplicateCode(String),

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Invalid signature: {0}")]
    BadSignature(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Service not initialized: {0}")]
    Initialization(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a required field that was absent or blank.
    pub fn missing(field: &str) -> Self {
        BillingError::Validation {
            field: field.to_string(),
            message: format!("Missing required field: {}", field),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        BillingError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn conflict(
        kind: ConflictKind,
        subscription_id: impl Into<String>,
        status: SubscriptionStatus,
    ) -> Self {
        BillingError::Conflict {
            kind,
            subscription_id: subscription_id.into(),
            status,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        BillingError::Upstream(message.into())
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        BillingError::Initialization(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation { .. } => "validation_error",
            BillingError::NotFound { .. } => "not_found",
            BillingError::Conflict { kind, .. } => kind.as_str(),
            BillingError::DuplicateCode(_) => "duplicate_code",
            BillingError::PaymentRejected(_) => "payment_rejected",
            BillingError::BadSignature(_) => "bad_signature",
            BillingError::Upstream(_) => "upstream_failure",
            BillingError::Initialization(_) => "initialization_error",
        }
    }

    /// Returns true if the operation may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Upstream(_))
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::EmptyField { field } => BillingError::missing(field),
            _ => BillingError::Validation {
                field: err.field().to_string(),
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_kind_follows_entitlement() {
        assert_eq!(
            ConflictKind::for_status(SubscriptionStatus::Trialing),
            ConflictKind::AlreadyActive
        );
        assert_eq!(
            ConflictKind::for_status(SubscriptionStatus::PastDue),
            ConflictKind::Pending
        );
    }

    #[test]
    fn conflict_code_is_kind() {
        let err = BillingError::conflict(
            ConflictKind::AlreadyActive,
            "sub_a",
            SubscriptionStatus::Active,
        );
        assert_eq!(err.code(), "already-active");
        assert_eq!(err.to_string(), "User already has an active subscription");
    }

    #[test]
    fn not_found_message_names_resource() {
        let err = BillingError::not_found("Plan", "plan_x");
        assert_eq!(err.to_string(), "Plan not found");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn validation_error_converts() {
        let err: BillingError = ValidationError::empty_field("userId").into();
        match err {
            BillingError::Validation { field, message } => {
                assert_eq!(field, "userId");
                assert_eq!(message, "Missing required field: userId");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn only_upstream_is_retryable() {
        assert!(BillingError::upstream("timeout").is_retryable());
        assert!(!BillingError::missing("email").is_retryable());
        assert!(!BillingError::initialization("no key").is_retryable());
    }
}
