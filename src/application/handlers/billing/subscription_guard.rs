//! SubscriptionGuard - refuses a new checkout while another subscription is live.
//!
//! Two passes: a local one against the stored `premium` record before any
//! Stripe call, and an authoritative one against the customer's Stripe
//! subscriptions once the customer id is known.

use std::sync::Arc;

use crate::application::reconciler::Reconciler;
use crate::domain::subscription::{
    BillingError, ConflictKind, ProjectionDirective, UserProfile,
};
use crate::ports::{PaymentProvider, SubscriptionQuery};

/// Page size for the authoritative check.
const GUARD_LIST_LIMIT: u32 = 20;

pub struct SubscriptionGuard {
    payments: Arc<dyn PaymentProvider>,
    reconciler: Reconciler,
}

impl SubscriptionGuard {
    pub fn new(payments: Arc<dyn PaymentProvider>, reconciler: Reconciler) -> Self {
        Self {
            payments,
            reconciler,
        }
    }

    /// Checks the stored record only.
    pub fn check_local(&self, profile: &UserProfile) -> Result<(), BillingError> {
        let Some(record) = profile.premium_record() else {
            return Ok(());
        };
        let Some(subscription_id) = record.stripe_subscription_id.as_deref() else {
            return Ok(());
        };

        if record.is_active {
            tracing::info!(
                user_id = %profile.id,
                subscription_id = %subscription_id,
                "Rejecting checkout: active subscription on record"
            );
            return Err(BillingError::conflict(
                ConflictKind::AlreadyActive,
                subscription_id,
                record.status,
            ));
        }
        if record.status.is_pending() {
            tracing::info!(
                user_id = %profile.id,
                subscription_id = %subscription_id,
                status = %record.status,
                "Rejecting checkout: pending subscription on record"
            );
            return Err(BillingError::conflict(
                ConflictKind::Pending,
                subscription_id,
                record.status,
            ));
        }
        Ok(())
    }

    /// Lists the customer's subscriptions at Stripe. A blocking one is
    /// projected onto the profile before the conflict is returned.
    pub async fn check_remote(
        &self,
        profile: &UserProfile,
        customer_id: &str,
    ) -> Result<(), BillingError> {
        let existing = self
            .payments
            .list_subscriptions(SubscriptionQuery {
                customer_id: Some(customer_id.to_string()),
                status: None,
                limit: GUARD_LIST_LIMIT,
            })
            .await?;

        let Some(latest) = existing
            .into_iter()
            .filter(|s| s.status.blocks_checkout())
            .max_by_key(|s| s.recency())
        else {
            return Ok(());
        };

        tracing::warn!(
            user_id = %profile.id,
            customer_id = %customer_id,
            subscription_id = %latest.id,
            status = %latest.status,
            "Stripe holds a live subscription the profile did not show; catching up"
        );
        if let Err(e) = self
            .reconciler
            .apply_to_profile(profile, &latest, ProjectionDirective::Observe)
            .await
        {
            tracing::warn!(user_id = %profile.id, error = %e, "Failed to project existing subscription");
        }

        Err(BillingError::conflict(
            ConflictKind::for_status(latest.status),
            latest.id,
            latest.status,
        ))
    }
}
