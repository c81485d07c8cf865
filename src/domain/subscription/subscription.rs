//! Snapshot of a Stripe subscription as the projector sees it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::status::SubscriptionStatus;
use crate::domain::foundation::Timestamp;

/// Metadata key carrying our user id on Stripe objects.
pub const METADATA_USER_ID: &str = "userId";

/// Metadata key carrying the local plan id on Stripe objects.
pub const METADATA_PLAN_ID: &str = "planId";

/// Authoritative subscription state retrieved from Stripe.
///
/// Instants are already converted from epoch seconds; absent or invalid
/// values are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub start_date: Option<Timestamp>,
    pub created: Option<Timestamp>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Price ids of the line items, in Stripe order.
    #[serde(default)]
    pub price_ids: Vec<String>,
}

impl Subscription {
    /// Plan id from metadata, falling back to the first line item's price id.
    pub fn plan_id(&self) -> Option<String> {
        self.metadata
            .get(METADATA_PLAN_ID)
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| self.price_ids.first().cloned())
    }

    /// User id recorded in metadata at checkout time, if any.
    pub fn user_id_hint(&self) -> Option<&str> {
        self.metadata
            .get(METADATA_USER_ID)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Ordering key for "most recent" comparisons.
    pub fn recency(&self) -> i64 {
        self.created
            .or(self.start_date)
            .map(|t| t.as_unix())
            .unwrap_or_default()
    }
}
