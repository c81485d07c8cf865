//! In-memory plan store and identity directory for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::domain::subscription::Plan;
use crate::ports::{IdentityDirectory, PlanStore, StoreError};

/// In-memory `premium_plans`.
#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: RwLock<HashMap<String, Plan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan: Plan) {
        self.plans
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(plan.id.clone(), plan);
    }

    pub fn plan(&self, plan_id: &str) -> Option<Plan> {
        self.plans
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(plan_id)
            .cloned()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn find_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self.plan(plan_id))
    }

    async fn record_stripe_ids(
        &self,
        plan_id: &str,
        product_id: &str,
        price_id: &str,
    ) -> Result<(), StoreError> {
        let mut plans = self.plans.write().unwrap_or_else(|p| p.into_inner());
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| StoreError::not_found(format!("plan {}", plan_id)))?;
        plan.stripe_product_id = Some(product_id.to_string());
        plan.stripe_price_id = Some(price_id.to_string());
        Ok(())
    }
}

/// In-memory identity directory keyed by lowercase email.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    users: RwLock<HashMap<String, UserId>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, email: &str, user_id: UserId) {
        self.users
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(email.trim().to_ascii_lowercase(), user_id);
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&email.trim().to_ascii_lowercase())
            .cloned())
    }
}
