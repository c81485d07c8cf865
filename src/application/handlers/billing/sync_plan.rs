//! SyncPlanHandler - upserts a plan's Stripe product and price.
//!
//! Creates are keyed by deterministic idempotency keys, so a retried or
//! concurrent sync of the same plan collapses onto one product and price.

use std::collections::HashMap;
use std::sync::Arc;

use super::checkout_metadata::require;
use crate::domain::subscription::{BillingError, Plan, METADATA_PLAN_ID};
use crate::ports::{CreatePriceRequest, CreateProductRequest, PaymentProvider, PlanStore, Price};

#[derive(Debug, Clone)]
pub struct SyncPlanCommand {
    pub plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlanResult {
    pub id: String,
    pub name: String,
    pub stripe_product_id: String,
    pub stripe_price_id: String,
    /// False when the stored ids already matched Stripe.
    pub created: bool,
}

pub struct SyncPlanHandler {
    payments: Arc<dyn PaymentProvider>,
    plans: Arc<dyn PlanStore>,
}

impl SyncPlanHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>, plans: Arc<dyn PlanStore>) -> Self {
        Self { payments, plans }
    }

    pub async fn handle(&self, cmd: SyncPlanCommand) -> Result<SyncPlanResult, BillingError> {
        let plan_id = require("planId", &cmd.plan_id)?;
        let plan = self
            .plans
            .find_plan(plan_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Plan", plan_id))?;

        let amount = plan.amount_minor()?;

        if let (Some(product_id), Some(price_id)) = (&plan.stripe_product_id, &plan.stripe_price_id) {
            if let Some(price) = self.payments.get_price(price_id).await? {
                if price_matches(&price, &plan, amount) {
                    tracing::debug!(plan_id = %plan.id, price_id = %price_id, "Plan already in sync");
                    return Ok(SyncPlanResult {
                        id: plan.id.clone(),
                        name: plan.name.clone(),
                        stripe_product_id: product_id.clone(),
                        stripe_price_id: price_id.clone(),
                        created: false,
                    });
                }
            }
        }

        let metadata = HashMap::from([(METADATA_PLAN_ID.to_string(), plan.id.clone())]);

        let product_id = match self.existing_product(&plan).await? {
            Some(id) => id,
            None => {
                self.payments
                    .create_product(CreateProductRequest {
                        name: plan.name.clone(),
                        description: plan.description.clone(),
                        metadata: metadata.clone(),
                        idempotency_key: Some(plan.product_idempotency_key()?),
                    })
                    .await?
                    .id
            }
        };

        let price = self
            .payments
            .create_price(CreatePriceRequest {
                product_id: product_id.clone(),
                unit_amount: amount,
                currency: plan.currency(),
                recurring_interval: plan.interval().stripe_interval().map(str::to_string),
                nickname: Some(plan.name.clone()),
                metadata,
                idempotency_key: Some(plan.price_idempotency_key()?),
            })
            .await?;

        self.plans
            .record_stripe_ids(&plan.id, &product_id, &price.id)
            .await?;

        tracing::info!(
            plan_id = %plan.id,
            product_id = %product_id,
            price_id = %price.id,
            amount_minor = amount,
            "Plan synced to Stripe"
        );

        Ok(SyncPlanResult {
            id: plan.id,
            name: plan.name,
            stripe_product_id: product_id,
            stripe_price_id: price.id,
            created: true,
        })
    }

    async fn existing_product(&self, plan: &Plan) -> Result<Option<String>, BillingError> {
        let Some(product_id) = &plan.stripe_product_id else {
            return Ok(None);
        };
        Ok(self
            .payments
            .get_product(product_id)
            .await?
            .filter(|p| p.active)
            .map(|p| p.id))
    }
}

fn price_matches(price: &Price, plan: &Plan, amount: i64) -> bool {
    price.active
        && price.unit_amount == Some(amount)
        && price.currency.eq_ignore_ascii_case(&plan.currency())
        && price.recurring_interval.as_deref() == plan.interval().stripe_interval()
}
