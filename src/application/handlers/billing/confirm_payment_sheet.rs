//! ConfirmPaymentSheetHandler - turns a succeeded intent into a subscription.

use std::sync::Arc;

use super::checkout_metadata::{require, METADATA_PRICE_ID};
use crate::application::reconciler::{ProfileTarget, Reconciler};
use crate::domain::foundation::UserId;
use crate::domain::subscription::{BillingError, ProjectionDirective, METADATA_PLAN_ID, METADATA_USER_ID};
use crate::ports::{CreateSubscriptionRequest, IntentKind, PaymentProvider, PlanStore};

#[derive(Debug, Clone)]
pub struct ConfirmPaymentSheetCommand {
    /// A SetupIntent (`seti_`) or PaymentIntent (`pi_`) id.
    pub payment_intent_id: String,
    pub plan_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPaymentSheetResult {
    pub subscription_id: String,
}

pub struct ConfirmPaymentSheetHandler {
    payments: Arc<dyn PaymentProvider>,
    plans: Arc<dyn PlanStore>,
    reconciler: Reconciler,
}

impl ConfirmPaymentSheetHandler {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        plans: Arc<dyn PlanStore>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            payments,
            plans,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: ConfirmPaymentSheetCommand,
    ) -> Result<ConfirmPaymentSheetResult, BillingError> {
        let user_id = UserId::new(cmd.user_id.trim())?;
        let intent_id = require("paymentIntentId", &cmd.payment_intent_id)?;
        let plan_id = require("planId", &cmd.plan_id)?;
        if IntentKind::from_id(intent_id).is_none() {
            return Err(BillingError::validation(
                "paymentIntentId",
                "Expected a SetupIntent or PaymentIntent id",
            ));
        }

        let intent = self
            .payments
            .get_intent(intent_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Payment intent", intent_id))?;
        if !intent.is_succeeded() {
            return Err(BillingError::validation(
                "paymentIntentId",
                format!("Payment not completed (status: {})", intent.status),
            ));
        }

        let plan = self
            .plans
            .find_plan(plan_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Plan", plan_id))?;

        let price_id = intent
            .metadata
            .get(METADATA_PRICE_ID)
            .filter(|p| !p.is_empty())
            .cloned()
            .or_else(|| plan.stripe_price_id.clone())
            .ok_or_else(|| {
                BillingError::validation("planId", "Plan has no Stripe price; sync the plan first")
            })?;

        let profile = self.reconciler.load_or_create(&user_id).await?;
        let customer_id = intent
            .customer_id
            .clone()
            .or_else(|| profile.customer_id().map(str::to_string))
            .ok_or_else(|| BillingError::validation("paymentIntentId", "Intent has no customer"))?;
        let payment_method = intent.payment_method.clone().ok_or_else(|| {
            BillingError::validation("paymentIntentId", "Intent has no payment method")
        })?;

        let mut metadata = intent.metadata.clone();
        metadata.insert(METADATA_USER_ID.to_string(), user_id.to_string());
        metadata.insert(METADATA_PLAN_ID.to_string(), plan.id.clone());
        metadata.insert(METADATA_PRICE_ID.to_string(), price_id.clone());

        let subscription = self
            .payments
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer_id.clone(),
                price_id,
                default_payment_method: Some(payment_method),
                metadata,
                idempotency_key: Some(format!("confirm-{}", intent.id)),
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Subscription created from PaymentSheet"
        );

        if let Err(e) = self
            .reconciler
            .apply(ProfileTarget::User(&user_id), &subscription, ProjectionDirective::Observe)
            .await
        {
            tracing::error!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                error = %e,
                "Subscription created but profile update failed; sync will repair"
            );
        }

        Ok(ConfirmPaymentSheetResult {
            subscription_id: subscription.id,
        })
    }
}
