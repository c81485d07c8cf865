//! CustomerResolver - finds or creates the Stripe customer for a profile.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::subscription::{BillingError, UserProfile};
use crate::ports::{CreateCustomerRequest, PaymentProvider, ProfileStore};

/// Customer details used when a new Stripe customer must be created.
#[derive(Debug, Clone, Default)]
pub struct CustomerDetails {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl CustomerDetails {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

/// The customer a flow should bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCustomer {
    pub customer_id: String,
    /// False only when this call created the customer.
    pub is_existing: bool,
}

/// Ensures a profile has a live Stripe customer.
///
/// Resolution order: the stored id if Stripe still has it, then an email
/// match, then a new customer. The id is back-patched onto the profile
/// best-effort.
pub struct CustomerResolver {
    payments: Arc<dyn PaymentProvider>,
    profiles: Arc<dyn ProfileStore>,
}

impl CustomerResolver {
    pub fn new(payments: Arc<dyn PaymentProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { payments, profiles }
    }

    pub async fn ensure(
        &self,
        profile: &UserProfile,
        details: &CustomerDetails,
    ) -> Result<ResolvedCustomer, BillingError> {
        let stored = profile.stripe_customer_id.as_deref().filter(|id| !id.is_empty());

        if let Some(customer_id) = stored {
            if self.payments.get_customer(customer_id).await?.is_some() {
                return Ok(ResolvedCustomer {
                    customer_id: customer_id.to_string(),
                    is_existing: true,
                });
            }
            tracing::warn!(
                user_id = %profile.id,
                customer_id = %customer_id,
                "Stored customer no longer exists at Stripe; clearing"
            );
            if let Err(e) = self.profiles.set_customer_id(&profile.id, None).await {
                tracing::warn!(user_id = %profile.id, error = %e, "Failed to clear stale customer id");
            }
        }

        let resolved = match self.payments.find_customer_by_email(&details.email).await? {
            Some(customer) => {
                tracing::info!(
                    user_id = %profile.id,
                    customer_id = %customer.id,
                    "Found existing customer by email"
                );
                ResolvedCustomer {
                    customer_id: customer.id,
                    is_existing: true,
                }
            }
            None => {
                let customer = self
                    .payments
                    .create_customer(CreateCustomerRequest {
                        user_id: profile.id.clone(),
                        email: details.email.clone(),
                        name: details.name.clone(),
                        phone: details.phone.clone(),
                        metadata: details.metadata.clone(),
                    })
                    .await?;
                tracing::info!(
                    user_id = %profile.id,
                    customer_id = %customer.id,
                    "Created customer"
                );
                ResolvedCustomer {
                    customer_id: customer.id,
                    is_existing: false,
                }
            }
        };

        if let Err(e) = self
            .profiles
            .set_customer_id(&profile.id, Some(&resolved.customer_id))
            .await
        {
            tracing::warn!(
                user_id = %profile.id,
                customer_id = %resolved.customer_id,
                error = %e,
                "Failed to back-patch customer id"
            );
        }

        Ok(resolved)
    }
}
