//! CreateCustomerHandler - links a user to a Stripe customer.

use std::collections::HashMap;

use super::checkout_metadata::require;
use super::customer_resolver::{CustomerDetails, CustomerResolver, ResolvedCustomer};
use crate::application::reconciler::Reconciler;
use crate::domain::foundation::UserId;
use crate::domain::subscription::BillingError;

#[derive(Debug, Clone, Default)]
pub struct CreateCustomerCommand {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub metadata: HashMap<String, String>,
}

pub struct CreateCustomerHandler {
    reconciler: Reconciler,
    customers: CustomerResolver,
}

impl CreateCustomerHandler {
    pub fn new(reconciler: Reconciler, customers: CustomerResolver) -> Self {
        Self {
            reconciler,
            customers,
        }
    }

    pub async fn handle(&self, cmd: CreateCustomerCommand) -> Result<ResolvedCustomer, BillingError> {
        let user_id = UserId::new(cmd.user_id.trim())?;
        let email = require("email", &cmd.email)?;
        if !email.contains('@') {
            return Err(BillingError::validation("email", "Invalid email address"));
        }

        let profile = self.reconciler.load_or_create(&user_id).await?;
        self.customers
            .ensure(
                &profile,
                &CustomerDetails {
                    email: email.to_string(),
                    name: cmd.name,
                    phone: cmd.phone,
                    metadata: cmd.metadata,
                },
            )
            .await
    }
}
