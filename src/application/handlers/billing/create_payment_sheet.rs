//! CreatePaymentSheetHandler - prepares a mobile PaymentSheet.
//!
//! Creates a SetupIntent and an ephemeral key for the customer. The
//! subscription itself is created later by `ConfirmPaymentSheetHandler`
//! once the intent has succeeded.

use std::sync::Arc;

use super::checkout_metadata::{require, CheckoutMetadata};
use super::customer_resolver::{CustomerDetails, CustomerResolver};
use super::subscription_guard::SubscriptionGuard;
use crate::application::reconciler::Reconciler;
use crate::domain::foundation::UserId;
use crate::domain::subscription::BillingError;
use crate::ports::{CreateSetupIntentRequest, PaymentProvider};

#[derive(Debug, Clone)]
pub struct CreatePaymentSheetCommand {
    pub user_id: String,
    pub email: String,
    pub plan_id: String,
    pub stripe_price_id: String,
    pub product_id: Option<String>,
    pub platform: Option<String>,
    pub coupon_id: Option<String>,
    pub promotion_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentSheetResult {
    pub setup_intent: String,
    pub setup_intent_id: String,
    pub ephemeral_key: String,
    pub customer: String,
    pub publishable_key: Option<String>,
    pub plan_id: String,
    pub stripe_price_id: String,
}

pub struct CreatePaymentSheetHandler {
    payments: Arc<dyn PaymentProvider>,
    reconciler: Reconciler,
    customers: CustomerResolver,
    guard: SubscriptionGuard,
    publishable_key: Option<String>,
}

impl CreatePaymentSheetHandler {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        reconciler: Reconciler,
        customers: CustomerResolver,
        guard: SubscriptionGuard,
        publishable_key: Option<String>,
    ) -> Self {
        Self {
            payments,
            reconciler,
            customers,
            guard,
            publishable_key,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreatePaymentSheetCommand,
    ) -> Result<CreatePaymentSheetResult, BillingError> {
        let user_id = UserId::new(cmd.user_id.trim())?;
        let email = require("email", &cmd.email)?;
        let plan_id = require("planId", &cmd.plan_id)?;
        let price_id = require("stripePriceId", &cmd.stripe_price_id)?;

        let profile = self.reconciler.load_or_create(&user_id).await?;
        self.guard.check_local(&profile)?;

        let customer = self
            .customers
            .ensure(&profile, &CustomerDetails::with_email(email))
            .await?;
        self.guard.check_remote(&profile, &customer.customer_id).await?;

        match self.payments.get_price(price_id).await? {
            Some(price) if price.active => {}
            _ => {
                return Err(BillingError::validation(
                    "stripePriceId",
                    format!("Invalid or inactive price: {}", price_id),
                ))
            }
        }

        let mut metadata = CheckoutMetadata {
            user_id: &user_id,
            plan_id,
            price_id,
            coupon_id: cmd.coupon_id.as_deref(),
            promotion_id: cmd.promotion_id.as_deref(),
        }
        .into_map();
        for (key, value) in [("productId", &cmd.product_id), ("platform", &cmd.platform)] {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                metadata.insert(key.to_string(), value.to_string());
            }
        }

        let intent = self
            .payments
            .create_setup_intent(CreateSetupIntentRequest {
                customer_id: customer.customer_id.clone(),
                metadata,
            })
            .await?;
        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| BillingError::upstream("SetupIntent returned without a client secret"))?;

        let ephemeral_key = self
            .payments
            .create_ephemeral_key(&customer.customer_id)
            .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.customer_id,
            setup_intent_id = %intent.id,
            plan_id = %plan_id,
            "PaymentSheet prepared"
        );

        Ok(CreatePaymentSheetResult {
            setup_intent: client_secret,
            setup_intent_id: intent.id,
            ephemeral_key,
            customer: customer.customer_id,
            publishable_key: self.publishable_key.clone(),
            plan_id: plan_id.to_string(),
            stripe_price_id: price_id.to_string(),
        })
    }
}
