//! Supabase implementation of the PlanStore port over `premium_plans`.

use async_trait::async_trait;
use serde::Serialize;

use super::client::SupabaseClient;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::Plan;
use crate::ports::{PlanStore, StoreError};

const TABLE: &str = "premium_plans";

#[derive(Debug, Clone)]
pub struct SupabasePlanStore {
    client: SupabaseClient,
}

#[derive(Serialize)]
struct StripeIdsPatch<'a> {
    stripe_product_id: &'a str,
    stripe_price_id: &'a str,
    updated_at: Timestamp,
}

impl SupabasePlanStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlanStore for SupabasePlanStore {
    async fn find_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        let rows: Vec<Plan> = self
            .client
            .select(
                TABLE,
                &[
                    ("id", format!("eq.{}", plan_id)),
                    ("select", "*".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn record_stripe_ids(
        &self,
        plan_id: &str,
        product_id: &str,
        price_id: &str,
    ) -> Result<(), StoreError> {
        let updated: Vec<serde_json::Value> = self
            .client
            .update(
                TABLE,
                &[("id", format!("eq.{}", plan_id)), ("select", "id".to_string())],
                &StripeIdsPatch {
                    stripe_product_id: product_id,
                    stripe_price_id: price_id,
                    updated_at: Timestamp::now(),
                },
            )
            .await?;
        if updated.is_empty() {
            return Err(StoreError::not_found(format!("plan {}", plan_id)));
        }
        tracing::info!(plan_id = %plan_id, product_id = %product_id, price_id = %price_id, "Recorded Stripe ids for plan");
        Ok(())
    }
}
