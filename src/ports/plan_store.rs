//! Plan store port for the `premium_plans` table.

use async_trait::async_trait;

use super::profile_store::StoreError;
use crate::domain::subscription::Plan;

/// Port for reading plans and recording their Stripe catalog ids.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError>;

    /// Persist the product and price ids created for a plan.
    async fn record_stripe_ids(
        &self,
        plan_id: &str,
        product_id: &str,
        price_id: &str,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn PlanStore) {}
    }
}
