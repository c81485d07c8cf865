//! HandleStripeWebhookHandler - verifies and applies Stripe webhook events.
//!
//! Verification runs on the raw body before anything is parsed or written.
//! After that every event is acknowledged: a failure applying one event is
//! logged and left for the periodic sync, so Stripe never retries a batch
//! because of one bad event.

use std::sync::Arc;

use crate::application::reconciler::{ProfileTarget, ReconcileOutcome, Reconciler};
use crate::domain::foundation::UserId;
use crate::domain::subscription::{BillingError, ProjectionDirective, Subscription};
use crate::ports::{
    CheckoutSession, Customer, IdentityDirectory, Invoice, PaymentProvider, ProfileStore,
    WebhookEvent, WebhookEventData, WebhookEventType,
};

/// Raw webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleStripeWebhookCommand {
    pub payload: Vec<u8>,
    pub signature: Option<String>,
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event was projected onto a profile.
    Reconciled(ReconcileOutcome),
    /// A customer id was linked to a profile.
    CustomerLinked { user_id: UserId },
    /// Recognized but nothing to do.
    Skipped(&'static str),
    /// Not an event type this service handles.
    Ignored,
    /// Applying the event failed; the delivery is still acknowledged.
    Failed(String),
}

pub struct HandleStripeWebhookHandler {
    payments: Arc<dyn PaymentProvider>,
    profiles: Arc<dyn ProfileStore>,
    identity: Option<Arc<dyn IdentityDirectory>>,
    reconciler: Reconciler,
}

impl HandleStripeWebhookHandler {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        profiles: Arc<dyn ProfileStore>,
        identity: Option<Arc<dyn IdentityDirectory>>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            payments,
            profiles,
            identity,
            reconciler,
        }
    }

    /// Verifies the delivery, then applies it. Only verification fails the call.
    pub async fn handle(&self, cmd: HandleStripeWebhookCommand) -> Result<WebhookOutcome, BillingError> {
        let signature = cmd
            .signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BillingError::BadSignature("Missing Stripe-Signature header".to_string()))?;

        let event = self
            .payments
            .verify_webhook(&cmd.payload, signature)
            .map_err(|e| {
                tracing::warn!(error = %e, "Webhook verification failed");
                BillingError::from(e)
            })?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type.as_str(),
            "Webhook received"
        );

        Ok(match self.dispatch(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type.as_str(),
                    error = %e,
                    "Webhook event failed; acknowledging"
                );
                WebhookOutcome::Failed(e.to_string())
            }
        })
    }

    /// Applies an already trusted event.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<WebhookOutcome, BillingError> {
        match (&event.event_type, &event.data) {
            (WebhookEventType::CheckoutSessionCompleted, WebhookEventData::CheckoutSession(session)) => {
                self.handle_checkout_completed(session).await
            }
            (
                WebhookEventType::SubscriptionCreated | WebhookEventType::SubscriptionUpdated,
                WebhookEventData::Subscription(sub),
            ) => self.project(sub, None, ProjectionDirective::Observe).await,
            (WebhookEventType::SubscriptionDeleted, WebhookEventData::Subscription(sub)) => {
                self.project(sub, None, ProjectionDirective::Canceled).await
            }
            (WebhookEventType::InvoicePaymentSucceeded, WebhookEventData::Invoice(invoice)) => {
                self.handle_invoice(invoice, ProjectionDirective::Observe).await
            }
            (WebhookEventType::InvoicePaymentFailed, WebhookEventData::Invoice(invoice)) => {
                self.handle_invoice(invoice, ProjectionDirective::PaymentFailed).await
            }
            (WebhookEventType::CustomerCreated, WebhookEventData::Customer(customer)) => {
                self.handle_customer(customer, true).await
            }
            (WebhookEventType::CustomerUpdated, WebhookEventData::Customer(customer)) => {
                self.handle_customer(customer, false).await
            }
            (WebhookEventType::Unknown(name), _) => {
                tracing::info!(event_id = %event.id, event_type = %name, "Unhandled event type");
                Ok(WebhookOutcome::Ignored)
            }
            (event_type, WebhookEventData::Malformed(reason)) => {
                Err(BillingError::upstream(format!(
                    "Undecodable {} payload: {}",
                    event_type.as_str(),
                    reason
                )))
            }
            (event_type, _) => Err(BillingError::upstream(format!(
                "Unexpected payload for {}",
                event_type.as_str()
            ))),
        }
    }

    async fn handle_checkout_completed(
        &self,
        session: &CheckoutSession,
    ) -> Result<WebhookOutcome, BillingError> {
        if !session.is_subscription_mode() {
            return Ok(WebhookOutcome::Skipped("not a subscription checkout"));
        }
        let Some(subscription_id) = &session.subscription_id else {
            return Ok(WebhookOutcome::Skipped("session has no subscription"));
        };
        let sub = self
            .payments
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Subscription", subscription_id.as_str()))?;
        self.project(&sub, Some(session), ProjectionDirective::Observe)
            .await
    }

    async fn handle_invoice(
        &self,
        invoice: &Invoice,
        directive: ProjectionDirective,
    ) -> Result<WebhookOutcome, BillingError> {
        let Some(subscription_id) = &invoice.subscription_id else {
            return Ok(WebhookOutcome::Skipped("invoice has no subscription"));
        };
        let sub = self
            .payments
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Subscription", subscription_id.as_str()))?;
        self.project(&sub, None, directive).await
    }

    async fn project(
        &self,
        sub: &Subscription,
        session: Option<&CheckoutSession>,
        directive: ProjectionDirective,
    ) -> Result<WebhookOutcome, BillingError> {
        let customer_id = session
            .and_then(|s| s.customer_id.as_deref())
            .unwrap_or(&sub.customer_id);
        let user_hint = session
            .and_then(CheckoutSession::user_id_hint)
            .or_else(|| sub.user_id_hint());

        let outcome = self
            .reconciler
            .apply(
                ProfileTarget::Customer {
                    customer_id,
                    user_hint,
                },
                sub,
                directive,
            )
            .await?;
        Ok(WebhookOutcome::Reconciled(outcome))
    }

    /// Links a customer id to a profile that has none. Never overwrites.
    async fn handle_customer(
        &self,
        customer: &Customer,
        allow_email_lookup: bool,
    ) -> Result<WebhookOutcome, BillingError> {
        let user_id = match customer.user_id_hint() {
            Some(hint) => Some(UserId::new(hint)?),
            None => match (&self.identity, &customer.email, allow_email_lookup) {
                (Some(identity), Some(email), true) => {
                    identity.find_user_id_by_email(email).await?
                }
                _ => None,
            },
        };
        let Some(user_id) = user_id else {
            tracing::debug!(customer_id = %customer.id, "Customer has no resolvable user");
            return Ok(WebhookOutcome::Skipped("no user for customer"));
        };

        let profile = match self.profiles.find_by_user_id(&user_id).await? {
            Some(profile) => profile,
            None if allow_email_lookup => self.profiles.insert_minimal(&user_id).await?,
            None => return Ok(WebhookOutcome::Skipped("no profile for customer")),
        };

        match profile.stripe_customer_id.as_deref().filter(|id| !id.is_empty()) {
            Some(existing) if existing == customer.id => {
                Ok(WebhookOutcome::Skipped("customer already linked"))
            }
            Some(existing) => {
                tracing::warn!(
                    user_id = %user_id,
                    existing_customer_id = %existing,
                    customer_id = %customer.id,
                    "Profile already linked to another customer; not overwriting"
                );
                Ok(WebhookOutcome::Skipped("profile linked to another customer"))
            }
            None => {
                self.profiles
                    .set_customer_id(&user_id, Some(&customer.id))
                    .await?;
                tracing::info!(user_id = %user_id, customer_id = %customer.id, "Customer linked");
                Ok(WebhookOutcome::CustomerLinked { user_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::adapters::memory::{InMemoryIdentityDirectory, InMemoryProfileStore};
    use crate::adapters::stripe::{active_subscription, MockPaymentProvider};
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::{SubscriptionStatus, UserProfile};

    const SECRET: &str = "whsec_test_secret";

    struct Fixture {
        mock: MockPaymentProvider,
        store: Arc<InMemoryProfileStore>,
        identity: Arc<InMemoryIdentityDirectory>,
        handler: HandleStripeWebhookHandler,
    }

    fn fixture() -> Fixture {
        let mock = MockPaymentProvider::new().with_webhook_secret(SECRET);
        let store = Arc::new(InMemoryProfileStore::new());
        let identity = Arc::new(InMemoryIdentityDirectory::new());
        let handler = HandleStripeWebhookHandler::new(
            Arc::new(mock.clone()),
            store.clone(),
            Some(identity.clone()),
            Reconciler::new(store.clone()),
        );
        Fixture {
            mock,
            store,
            identity,
            handler,
        }
    }

    fn user() -> UserId {
        UserId::new("U1").unwrap()
    }

    fn linked_profile(store: &InMemoryProfileStore) {
        let mut profile = UserProfile::minimal(user());
        profile.stripe_customer_id = Some("cus_1".to_string());
        store.insert(profile);
    }

    fn subscription_event(event_type: &str, status: &str) -> Vec<u8> {
        let now = Timestamp::now().as_unix();
        serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "created": now,
            "data": { "object": {
                "id": "sub_a",
                "object": "subscription",
                "customer": "cus_1",
                "status": status,
                "current_period_start": now - 86_400,
                "current_period_end": now + 86_400 * 29,
                "cancel_at_period_end": false,
                "created": now - 86_400,
                "start_date": now - 86_400,
                "metadata": {},
                "items": { "data": [ { "id": "si_1", "price": { "id": "price_123" } } ] }
            }}
        })
        .to_string()
        .into_bytes()
    }

    fn signed(f: &Fixture, payload: Vec<u8>) -> HandleStripeWebhookCommand {
        let signature = f.mock.sign(&payload);
        HandleStripeWebhookCommand { payload, signature }
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_writes() {
        let f = fixture();
        linked_profile(&f.store);

        let err = f
            .handler
            .handle(HandleStripeWebhookCommand {
                payload: b"{}".to_vec(),
                signature: Some("invalid".to_string()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::BadSignature(_)));
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let f = fixture();
        let err = f
            .handler
            .handle(HandleStripeWebhookCommand {
                payload: b"{}".to_vec(),
                signature: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::BadSignature(_)));
    }

    #[tokio::test]
    async fn past_due_update_replay_is_idempotent() {
        let f = fixture();
        linked_profile(&f.store);
        let payload = subscription_event("customer.subscription.updated", "past_due");

        f.handler.handle(signed(&f, payload.clone())).await.unwrap();
        let first = f.store.premium(&user()).unwrap();
        assert!(!first.is_active);
        assert_eq!(first.status, SubscriptionStatus::PastDue);
        let writes = f.store.write_count();

        let outcome = f.handler.handle(signed(&f, payload)).await.unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Reconciled(ReconcileOutcome::Unchanged { .. })
        ));
        assert_eq!(f.store.write_count(), writes);
        assert_eq!(f.store.premium(&user()).unwrap(), first);
    }

    #[tokio::test]
    async fn deleted_subscription_deactivates() {
        let f = fixture();
        linked_profile(&f.store);
        f.handler
            .handle(signed(&f, subscription_event("customer.subscription.created", "active")))
            .await
            .unwrap();
        assert!(f.store.premium(&user()).unwrap().is_active);

        f.handler
            .handle(signed(&f, subscription_event("customer.subscription.deleted", "active")))
            .await
            .unwrap();

        let premium = f.store.premium(&user()).unwrap();
        assert!(!premium.is_active);
        assert_eq!(premium.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn failed_invoice_fetches_and_forces_past_due() {
        let f = fixture();
        linked_profile(&f.store);
        f.mock
            .add_subscription(active_subscription("cus_1", "sub_a", Timestamp::now()));
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "invoice.payment_failed",
            "data": { "object": {
                "id": "in_1",
                "object": "invoice",
                "customer": "cus_1",
                "subscription": "sub_a",
                "amount_paid": 0,
                "currency": "usd"
            }}
        })
        .to_string()
        .into_bytes();

        f.handler.handle(signed(&f, payload)).await.unwrap();

        let premium = f.store.premium(&user()).unwrap();
        assert_eq!(premium.status, SubscriptionStatus::PastDue);
        assert!(!premium.is_active);
    }

    #[tokio::test]
    async fn event_failure_is_acknowledged() {
        let f = fixture();
        linked_profile(&f.store);
        let payload = serde_json::json!({
            "id": "evt_3",
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "id": "in_1",
                "object": "invoice",
                "customer": "cus_1",
                "subscription": "sub_missing",
                "amount_paid": 999,
                "currency": "usd"
            }}
        })
        .to_string()
        .into_bytes();

        let outcome = f.handler.handle(signed(&f, payload)).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn undecodable_subscription_fails_but_is_acknowledged() {
        let f = fixture();
        linked_profile(&f.store);
        let payload = subscription_event("customer.subscription.updated", "some_new_status");

        let outcome = f.handler.handle(signed(&f, payload)).await.unwrap();

        assert!(
            matches!(outcome, WebhookOutcome::Failed(ref reason) if reason.contains("some_new_status")),
            "{:?}",
            outcome
        );
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn unknown_event_is_ignored() {
        let f = fixture();
        let payload = serde_json::json!({
            "id": "evt_4",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1", "object": "charge" } }
        })
        .to_string()
        .into_bytes();

        let outcome = f.handler.handle(signed(&f, payload)).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert_eq!(f.store.write_count(), 0);
    }

    fn customer(metadata: HashMap<String, String>) -> Customer {
        Customer {
            id: "cus_new".to_string(),
            email: Some("a@b.co".to_string()),
            name: None,
            metadata,
        }
    }

    fn customer_event(event_type: WebhookEventType, customer: Customer) -> WebhookEvent {
        WebhookEvent {
            id: "evt_c".to_string(),
            event_type,
            data: WebhookEventData::Customer(customer),
            created: None,
        }
    }

    #[tokio::test]
    async fn customer_created_links_by_email() {
        let f = fixture();
        f.identity.add_user("A@B.co", user());

        let outcome = f
            .handler
            .dispatch(&customer_event(WebhookEventType::CustomerCreated, customer(HashMap::new())))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::CustomerLinked { user_id: user() });
        assert_eq!(
            f.store.profile(&user()).unwrap().stripe_customer_id.as_deref(),
            Some("cus_new")
        );
    }

    #[tokio::test]
    async fn customer_created_never_overwrites_existing_link() {
        let f = fixture();
        linked_profile(&f.store);
        let metadata = HashMap::from([("userId".to_string(), "U1".to_string())]);

        f.handler
            .dispatch(&customer_event(WebhookEventType::CustomerCreated, customer(metadata)))
            .await
            .unwrap();

        assert_eq!(
            f.store.profile(&user()).unwrap().stripe_customer_id.as_deref(),
            Some("cus_1")
        );
    }

    #[tokio::test]
    async fn customer_updated_skips_email_lookup() {
        let f = fixture();
        f.identity.add_user("a@b.co", user());

        let outcome = f
            .handler
            .dispatch(&customer_event(WebhookEventType::CustomerUpdated, customer(HashMap::new())))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Skipped(_)));
        assert!(f.store.profile(&user()).is_none());
    }
}
