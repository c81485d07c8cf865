//! VerifySessionHandler - confirms a completed Checkout and catches the profile up.

use std::sync::Arc;

use super::checkout_metadata::require;
use crate::application::reconciler::{ProfileTarget, Reconciler};
use crate::domain::subscription::{BillingError, ProjectionDirective};
use crate::ports::{CheckoutSession, PaymentProvider};

#[derive(Debug, Clone)]
pub struct VerifySessionQuery {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifySessionResult {
    pub session: CheckoutSession,
}

pub struct VerifySessionHandler {
    payments: Arc<dyn PaymentProvider>,
    reconciler: Reconciler,
}

impl VerifySessionHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>, reconciler: Reconciler) -> Self {
        Self {
            payments,
            reconciler,
        }
    }

    pub async fn handle(&self, query: VerifySessionQuery) -> Result<VerifySessionResult, BillingError> {
        let session_id = require("session_id", &query.session_id)?;

        let session = self
            .payments
            .get_checkout_session(session_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Checkout session", session_id))?;

        if !session.is_paid() {
            return Err(BillingError::validation(
                "session_id",
                format!(
                    "Payment not completed (status: {})",
                    session.payment_status.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        let subscription = match (&session.subscription, &session.subscription_id) {
            (Some(sub), _) => Some(sub.clone()),
            (None, Some(id)) => self.payments.get_subscription(id).await?,
            (None, None) => None,
        };

        match subscription {
            Some(sub) => {
                let customer_id = session
                    .customer_id
                    .clone()
                    .unwrap_or_else(|| sub.customer_id.clone());
                let user_hint = session.user_id_hint().or_else(|| sub.user_id_hint());
                let target = ProfileTarget::Customer {
                    customer_id: &customer_id,
                    user_hint,
                };
                if let Err(e) = self
                    .reconciler
                    .apply(target, &sub, ProjectionDirective::Observe)
                    .await
                {
                    tracing::error!(
                        session_id = %session.id,
                        subscription_id = %sub.id,
                        error = %e,
                        "Session verified but profile update failed; sync will repair"
                    );
                }
            }
            None => tracing::warn!(session_id = %session.id, "Paid session has no subscription"),
        }

        Ok(VerifySessionResult { session })
    }
}
