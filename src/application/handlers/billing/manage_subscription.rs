//! Cancel and reactivate handlers.
//!
//! Both toggle `cancel_at_period_end` at Stripe and then project the
//! returned subscription. Stripe keeps the status `active` until the period
//! ends, so a cancel never revokes entitlement immediately.

use std::collections::HashMap;
use std::sync::Arc;

use super::checkout_metadata::require;
use crate::application::reconciler::Reconciler;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{BillingError, ProjectionDirective, Subscription, UserProfile};
use crate::ports::{PaymentProvider, SubscriptionUpdate};

#[derive(Debug, Clone)]
pub struct ManageSubscriptionCommand {
    pub user_id: String,
    pub subscription_id: String,
}

/// Subscription state after the change, as Stripe reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageSubscriptionResult {
    pub subscription: Subscription,
}

/// Shared ownership check and write path.
struct SubscriptionManager {
    payments: Arc<dyn PaymentProvider>,
    reconciler: Reconciler,
}

impl SubscriptionManager {
    /// Loads the profile and subscription, rejecting a customer mismatch.
    async fn load_owned(
        &self,
        cmd: &ManageSubscriptionCommand,
    ) -> Result<(UserProfile, Subscription), BillingError> {
        let user_id = UserId::new(cmd.user_id.trim())?;
        let subscription_id = require("subscriptionId", &cmd.subscription_id)?;

        let profile = self.reconciler.load_or_create(&user_id).await?;
        let subscription = self
            .payments
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::validation("subscriptionId", "Subscription not found"))?;

        if profile.customer_id() != Some(subscription.customer_id.as_str()) {
            tracing::warn!(
                user_id = %user_id,
                subscription_id = %subscription_id,
                "Subscription does not belong to user"
            );
            return Err(BillingError::validation(
                "subscriptionId",
                "Subscription does not belong to user",
            ));
        }
        Ok((profile, subscription))
    }

    async fn update_and_project(
        &self,
        profile: &UserProfile,
        subscription_id: &str,
        update: SubscriptionUpdate,
        directive: ProjectionDirective,
    ) -> Result<Subscription, BillingError> {
        let updated = self
            .payments
            .update_subscription(subscription_id, update)
            .await?;

        // Re-read so a concurrent webhook write is not clobbered by a stale row.
        let current = self
            .reconciler
            .load_or_create(&profile.id)
            .await
            .unwrap_or_else(|_| profile.clone());
        if let Err(e) = self
            .reconciler
            .apply_to_profile(&current, &updated, directive)
            .await
        {
            tracing::error!(
                user_id = %profile.id,
                subscription_id = %subscription_id,
                error = %e,
                "Stripe updated but profile update failed; sync will repair"
            );
        }
        Ok(updated)
    }
}

pub struct CancelSubscriptionHandler {
    inner: SubscriptionManager,
}

impl CancelSubscriptionHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>, reconciler: Reconciler) -> Self {
        Self {
            inner: SubscriptionManager {
                payments,
                reconciler,
            },
        }
    }

    pub async fn handle(
        &self,
        cmd: ManageSubscriptionCommand,
    ) -> Result<ManageSubscriptionResult, BillingError> {
        let (profile, subscription) = self.inner.load_owned(&cmd).await?;

        let update = SubscriptionUpdate {
            cancel_at_period_end: Some(true),
            metadata: HashMap::from([
                ("canceledBy".to_string(), "user".to_string()),
                (
                    "cancellationRequestedAt".to_string(),
                    Timestamp::now().to_rfc3339(),
                ),
            ]),
        };
        let updated = self
            .inner
            .update_and_project(&profile, &subscription.id, update, ProjectionDirective::Observe)
            .await?;

        tracing::info!(
            user_id = %profile.id,
            subscription_id = %updated.id,
            "Subscription set to cancel at period end"
        );
        Ok(ManageSubscriptionResult {
            subscription: updated,
        })
    }
}

pub struct ReactivateSubscriptionHandler {
    inner: SubscriptionManager,
}

impl ReactivateSubscriptionHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>, reconciler: Reconciler) -> Self {
        Self {
            inner: SubscriptionManager {
                payments,
                reconciler,
            },
        }
    }

    pub async fn handle(
        &self,
        cmd: ManageSubscriptionCommand,
    ) -> Result<ManageSubscriptionResult, BillingError> {
        let (profile, subscription) = self.inner.load_owned(&cmd).await?;

        if !subscription.status.is_live() {
            return Err(BillingError::validation(
                "subscriptionId",
                format!(
                    "Subscription is {} and cannot be reactivated",
                    subscription.status
                ),
            ));
        }

        let update = SubscriptionUpdate {
            cancel_at_period_end: Some(false),
            metadata: HashMap::from([(
                "reactivatedAt".to_string(),
                Timestamp::now().to_rfc3339(),
            )]),
        };
        let updated = self
            .inner
            .update_and_project(
                &profile,
                &subscription.id,
                update,
                ProjectionDirective::Reactivated,
            )
            .await?;

        tracing::info!(
            user_id = %profile.id,
            subscription_id = %updated.id,
            "Subscription reactivated"
        );
        Ok(ManageSubscriptionResult {
            subscription: updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProfileStore;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::application::reconciler::ProfileTarget;

    struct Fixture {
        mock: MockPaymentProvider,
        store: Arc<InMemoryProfileStore>,
        cancel: CancelSubscriptionHandler,
        reactivate: ReactivateSubscriptionHandler,
    }

    async fn fixture() -> Fixture {
        let mock = MockPaymentProvider::with_active_subscription("cus_1", "sub_a");
        let store = Arc::new(InMemoryProfileStore::new());
        let reconciler = Reconciler::new(store.clone());
        let sub = mock.subscription("sub_a").unwrap();
        reconciler
            .apply(ProfileTarget::User(&user()), &sub, ProjectionDirective::Observe)
            .await
            .unwrap();
        let payments: Arc<dyn PaymentProvider> = Arc::new(mock.clone());
        Fixture {
            cancel: CancelSubscriptionHandler::new(payments.clone(), reconciler.clone()),
            reactivate: ReactivateSubscriptionHandler::new(payments, reconciler),
            mock,
            store,
        }
    }

    fn user() -> UserId {
        UserId::new("U1").unwrap()
    }

    fn command() -> ManageSubscriptionCommand {
        ManageSubscriptionCommand {
            user_id: "U1".to_string(),
            subscription_id: "sub_a".to_string(),
        }
    }

    #[tokio::test]
    async fn cancel_then_reactivate_keeps_entitlement() {
        let f = fixture().await;

        let canceled = f.cancel.handle(command()).await.unwrap();
        assert!(canceled.subscription.cancel_at_period_end);
        let premium = f.store.premium(&user()).unwrap();
        assert!(premium.is_active);
        assert!(premium.cancel_at_period_end);
        assert!(premium.canceled_at.is_some());
        assert_eq!(premium.status.as_str(), "active");

        let reactivated = f.reactivate.handle(command()).await.unwrap();
        assert!(!reactivated.subscription.cancel_at_period_end);
        let premium = f.store.premium(&user()).unwrap();
        assert!(premium.is_active);
        assert!(!premium.cancel_at_period_end);
        assert!(premium.canceled_at.is_none());
        assert!(premium.reactivated_at.is_some());
    }

    #[tokio::test]
    async fn foreign_subscription_is_rejected() {
        let f = fixture().await;
        f.mock.add_subscription(crate::adapters::stripe::active_subscription(
            "cus_other",
            "sub_other",
            Timestamp::now(),
        ));
        let writes = f.store.write_count();

        let err = f
            .cancel
            .handle(ManageSubscriptionCommand {
                user_id: "U1".to_string(),
                subscription_id: "sub_other".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
        assert!(!f.mock.was_called("update_subscription"));
        assert_eq!(f.store.write_count(), writes);
    }

    #[tokio::test]
    async fn missing_subscription_is_bad_request() {
        let f = fixture().await;
        let err = f
            .cancel
            .handle(ManageSubscriptionCommand {
                user_id: "U1".to_string(),
                subscription_id: "sub_missing".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation { .. }));
    }
}
