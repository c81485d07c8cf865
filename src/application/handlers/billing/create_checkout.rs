//! CreateCheckoutHandler - starts a hosted Stripe Checkout for a plan.

use std::sync::Arc;

use super::checkout_metadata::{require, CheckoutMetadata};
use super::customer_resolver::{CustomerDetails, CustomerResolver};
use super::subscription_guard::SubscriptionGuard;
use crate::application::reconciler::Reconciler;
use crate::domain::foundation::UserId;
use crate::domain::subscription::BillingError;
use crate::ports::{CheckoutDiscount, CreateCheckoutRequest, PaymentProvider};

/// Command to start a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: String,
    pub email: String,
    pub plan_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub coupon_id: Option<String>,
    pub promotion_id: Option<String>,
}

/// Session the client should redirect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutResult {
    pub url: Option<String>,
    pub session_id: String,
    pub customer_id: String,
}

pub struct CreateCheckoutHandler {
    payments: Arc<dyn PaymentProvider>,
    reconciler: Reconciler,
    customers: CustomerResolver,
    guard: SubscriptionGuard,
}

impl CreateCheckoutHandler {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        reconciler: Reconciler,
        customers: CustomerResolver,
        guard: SubscriptionGuard,
    ) -> Self {
        Self {
            payments,
            reconciler,
            customers,
            guard,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        let user_id = UserId::new(cmd.user_id.trim())?;
        let email = require("email", &cmd.email)?;
        let plan_id = require("planId", &cmd.plan_id)?;
        let price_id = require("priceId", &cmd.price_id)?;
        let success_url = require("successUrl", &cmd.success_url)?;
        let cancel_url = require("cancelUrl", &cmd.cancel_url)?;

        // 1. Profile, created empty on first sight
        let profile = self.reconciler.load_or_create(&user_id).await?;

        // 2. Local double-subscription guard
        self.guard.check_local(&profile)?;

        // 3. Customer
        let customer = self
            .customers
            .ensure(&profile, &CustomerDetails::with_email(email))
            .await?;

        // 4. Authoritative guard against Stripe
        self.guard.check_remote(&profile, &customer.customer_id).await?;

        // 5. Session
        let metadata = CheckoutMetadata {
            user_id: &user_id,
            plan_id,
            price_id,
            coupon_id: cmd.coupon_id.as_deref(),
            promotion_id: cmd.promotion_id.as_deref(),
        };
        let session = self
            .payments
            .create_checkout_session(CreateCheckoutRequest {
                customer_id: customer.customer_id.clone(),
                price_id: price_id.to_string(),
                success_url: success_url.to_string(),
                cancel_url: cancel_url.to_string(),
                metadata: metadata.into_map(),
                discount: checkout_discount(cmd.coupon_id.as_deref(), cmd.promotion_id.as_deref()),
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.customer_id,
            session_id = %session.id,
            plan_id = %plan_id,
            "Checkout session created"
        );

        Ok(CreateCheckoutResult {
            url: session.url,
            session_id: session.id,
            customer_id: customer.customer_id,
        })
    }
}

/// A coupon applies directly; a Stripe promotion code id is pre-applied;
/// otherwise the customer may enter a code on the hosted page.
fn checkout_discount(coupon_id: Option<&str>, promotion_id: Option<&str>) -> CheckoutDiscount {
    let coupon_id = coupon_id.map(str::trim).filter(|c| !c.is_empty());
    let promotion_id = promotion_id.map(str::trim).filter(|p| p.starts_with("promo_"));
    match (coupon_id, promotion_id) {
        (Some(coupon), _) => CheckoutDiscount::Coupon(coupon.to_string()),
        (None, Some(promo)) => CheckoutDiscount::PromotionCode(promo.to_string()),
        (None, None) => CheckoutDiscount::AllowPromotionCodes,
    }
}
