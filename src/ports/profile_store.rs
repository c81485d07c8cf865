//! Profile store port for the `user_profiles` table.
//!
//! The store is the only persistence this service writes. Writes of the
//! `premium` object always replace it whole.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{BillingError, PremiumRecord, UserProfile};

/// Port for reading and patching user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Point read by user id.
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Read by the `stripe_customer_id` column.
    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, StoreError>;

    /// Read by `premium.stripeSubscriptionId`. The periodic sync falls back
    /// to it when a canceled subscription's customer matches no profile.
    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserProfile>, StoreError>;

    /// Insert an empty profile row. An existing row is returned unchanged.
    async fn insert_minimal(&self, user_id: &UserId) -> Result<UserProfile, StoreError>;

    /// Set or clear the `stripe_customer_id` column.
    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Replace the `premium` object.
    ///
    /// Also sets the `stripe_customer_id` column to the record's customer id
    /// so the two never disagree.
    async fn write_premium(&self, user_id: &UserId, premium: &PremiumRecord)
        -> Result<(), StoreError>;

    /// One page of profiles whose stored record is active but whose period
    /// ended before `now`, ordered by id and starting strictly after `after`.
    /// A page shorter than `limit` is the last one.
    async fn list_lapsed_active(
        &self,
        now: Timestamp,
        after: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<UserProfile>, StoreError>;

    /// Trivial select used by readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Store failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Row absent where one was required (PostgREST `PGRST116`).
    NotFound,
    /// Network or HTTP-level failure.
    Transport,
    /// Rejected credentials.
    Unauthorized,
    /// Constraint violation reported by the database.
    Constraint,
    /// Response body did not have the expected shape.
    Decode,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::NotFound => "not_found",
            StoreErrorCode::Transport => "transport",
            StoreErrorCode::Unauthorized => "unauthorized",
            StoreErrorCode::Constraint => "constraint",
            StoreErrorCode::Decode => "decode",
        }
    }
}

/// Errors from profile and plan store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", code.as_str())]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Transport, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Constraint, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Decode, message)
    }
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        match err.code {
            StoreErrorCode::NotFound => BillingError::not_found("Profile", err.message),
            _ => BillingError::Upstream(err.to_string()),
        }
    }
}
