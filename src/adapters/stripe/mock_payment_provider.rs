//! Mock payment provider for testing.
//!
//! A stateful in-memory stand-in for Stripe implementing `PaymentProvider`.
//! Supports:
//! - Seeded customers, subscriptions, intents, sessions and catalog objects
//! - Error injection, globally or per method
//! - Call tracking
//! - Real webhook signature verification with a configured secret

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{
    signature_header, Coupon, CouponDuration, DiscountType, NewCoupon, PromotionCode,
    StripeWebhookVerifier, Subscription, SubscriptionStatus, WebhookError, METADATA_USER_ID,
};
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, CreatePriceRequest,
    CreateProductRequest, CreatePromotionCodeRequest, CreateSetupIntentRequest,
    CreateSubscriptionRequest, Customer, EventQuery, Intent, IntentKind, Invoice, PaymentError,
    PaymentProvider, Price, Product, SubscriptionQuery, SubscriptionUpdate, WebhookEvent,
};

use super::webhook_types::StripeWebhookEvent;

/// Length of a mock billing period.
const MOCK_PERIOD_DAYS: i64 = 30;

/// Mock payment provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new().with_webhook_secret("whsec_test");
///
/// // Seed state
/// mock.add_subscription(subscription);
///
/// // Inject errors
/// mock.set_method_error("create_subscription", PaymentError::card_declined("Test decline"));
///
/// // Assert on traffic
/// assert_eq!(mock.call_count("list_subscriptions"), 1);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentProvider {
    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct MockState {
    customers: HashMap<String, Customer>,
    subscriptions: HashMap<String, Subscription>,
    intents: HashMap<String, Intent>,
    sessions: HashMap<String, CheckoutSession>,
    products: HashMap<String, Product>,
    prices: HashMap<String, Price>,
    coupons: HashMap<String, Coupon>,
    /// Keyed by customer-facing code.
    promotion_codes: HashMap<String, PromotionCode>,
    invoices: Vec<Invoice>,
    events: Vec<WebhookEvent>,

    /// Idempotency key to the id of the object it created.
    idempotency: HashMap<String, String>,

    /// Monotonic counter for generated ids.
    sequence: u64,

    /// Error to return on next call.
    next_error: Option<PaymentError>,

    /// Specific errors by method name.
    method_errors: HashMap<String, PaymentError>,

    /// Track method calls for assertions.
    call_log: Vec<MethodCall>,

    /// Signing secret; webhooks are not configured without one.
    webhook_secret: Option<String>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}_mock_{}", prefix, self.sequence)
    }
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    /// Create a new mock provider with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify webhooks against this signing secret.
    pub fn with_webhook_secret(self, secret: impl Into<String>) -> Self {
        self.state().webhook_secret = Some(secret.into());
        self
    }

    /// Create a mock holding one active subscription for the customer.
    pub fn with_active_subscription(customer_id: &str, subscription_id: &str) -> Self {
        let mock = Self::new();
        mock.add_customer(Customer {
            id: customer_id.to_string(),
            email: None,
            name: None,
            metadata: HashMap::new(),
        });
        mock.add_subscription(active_subscription(customer_id, subscription_id, Timestamp::now()));
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Seeding and inspection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_customer(&self, customer: Customer) {
        let id = customer.id.clone();
        self.state().customers.insert(id, customer);
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        let id = subscription.id.clone();
        self.state().subscriptions.insert(id, subscription);
    }

    pub fn add_intent(&self, intent: Intent) {
        let id = intent.id.clone();
        self.state().intents.insert(id, intent);
    }

    pub fn add_checkout_session(&self, session: CheckoutSession) {
        let id = session.id.clone();
        self.state().sessions.insert(id, session);
    }

    pub fn add_product(&self, product: Product) {
        let id = product.id.clone();
        self.state().products.insert(id, product);
    }

    pub fn add_price(&self, price: Price) {
        let id = price.id.clone();
        self.state().prices.insert(id, price);
    }

    pub fn add_coupon(&self, coupon: Coupon) {
        let id = coupon.id.clone();
        self.state().coupons.insert(id, coupon);
    }

    pub fn add_promotion_code(&self, code: PromotionCode) {
        let key = code.code.clone();
        self.state().promotion_codes.insert(key, code);
    }

    pub fn add_invoice(&self, invoice: Invoice) {
        self.state().invoices.push(invoice);
    }

    pub fn add_event(&self, event: WebhookEvent) {
        self.state().events.push(event);
    }

    /// Marks an intent as succeeded with the given payment method.
    pub fn succeed_intent(&self, intent_id: &str, payment_method: &str) {
        if let Some(intent) = self.state().intents.get_mut(intent_id) {
            intent.status = "succeeded".to_string();
            intent.payment_method = Some(payment_method.to_string());
        }
    }

    /// Marks a checkout session paid and attaches a new active subscription.
    pub fn complete_checkout(&self, session_id: &str, subscription_id: &str) {
        let mut state = self.state();
        let Some(session) = state.sessions.get(session_id).cloned() else {
            return;
        };
        let customer_id = session.customer_id.clone().unwrap_or_default();
        let mut sub = active_subscription(&customer_id, subscription_id, Timestamp::now());
        sub.metadata = session.metadata.clone();
        state.subscriptions.insert(subscription_id.to_string(), sub);
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.status = Some("complete".to_string());
            session.payment_status = Some("paid".to_string());
            session.subscription_id = Some(subscription_id.to_string());
        }
    }

    /// Current state of a subscription, as Stripe would report it.
    pub fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.state().subscriptions.get(subscription_id).cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    pub fn customer_count(&self) -> usize {
        self.state().customers.len()
    }

    /// Signs a payload with the configured secret, as Stripe would.
    pub fn sign(&self, payload: &[u8]) -> Option<String> {
        let secret = self.state().webhook_secret.clone()?;
        Some(signature_header(&secret, chrono::Utc::now().timestamp(), payload))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error injection and call tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Fail the next call, whichever method it is.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Fail every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        let mut state = self.state();
        if let Some(err) = state.method_errors.get(method) {
            return Err(err.clone());
        }
        match state.next_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Records the call and applies injected errors.
    fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        self.record_call(method, args);
        self.check_error(method)
    }
}

/// An active subscription for one mock billing period starting at `now`.
pub fn active_subscription(customer_id: &str, subscription_id: &str, now: Timestamp) -> Subscription {
    Subscription {
        id: subscription_id.to_string(),
        customer_id: customer_id.to_string(),
        status: SubscriptionStatus::Active,
        current_period_start: Some(now),
        current_period_end: Some(now.add_days(MOCK_PERIOD_DAYS)),
        cancel_at_period_end: false,
        canceled_at: None,
        start_date: Some(now),
        created: Some(now),
        metadata: HashMap::new(),
        price_ids: vec!["price_mock".to_string()],
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        self.enter("create_customer", vec![request.user_id.to_string(), request.email.clone()])?;

        let mut state = self.state();
        let mut metadata = request.metadata;
        metadata.insert(METADATA_USER_ID.to_string(), request.user_id.to_string());
        let customer = Customer {
            id: state.next_id("cus"),
            email: Some(request.email),
            name: request.name,
            metadata,
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, PaymentError> {
        self.enter("get_customer", vec![customer_id.to_string()])?;
        Ok(self.state().customers.get(customer_id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, PaymentError> {
        self.enter("find_customer_by_email", vec![email.to_string()])?;
        let state = self.state();
        let mut matches: Vec<&Customer> = state
            .customers
            .values()
            .filter(|c| c.email.as_deref() == Some(email))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.first().map(|c| (*c).clone()))
    }

    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<String, PaymentError> {
        self.enter("create_ephemeral_key", vec![customer_id.to_string()])?;
        let mut state = self.state();
        Ok(format!("{}_secret", state.next_id("ek")))
    }

    async fn create_setup_intent(
        &self,
        request: CreateSetupIntentRequest,
    ) -> Result<Intent, PaymentError> {
        self.enter("create_setup_intent", vec![request.customer_id.clone()])?;
        let mut state = self.state();
        let id = state.next_id("seti");
        let intent = Intent {
            client_secret: Some(format!("{}_secret_mock", id)),
            id,
            kind: IntentKind::Setup,
            status: "requires_payment_method".to_string(),
            customer_id: Some(request.customer_id),
            payment_method: None,
            metadata: request.metadata,
        };
        state.intents.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, PaymentError> {
        self.enter("get_intent", vec![intent_id.to_string()])?;
        if IntentKind::from_id(intent_id).is_none() {
            return Err(PaymentError::invalid_request(format!(
                "Unrecognized intent id: {}",
                intent_id
            )));
        }
        Ok(self.state().intents.get(intent_id).cloned())
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.enter(
            "create_checkout_session",
            vec![request.customer_id.clone(), request.price_id.clone()],
        )?;
        let mut state = self.state();
        let id = state.next_id("cs");
        let session = CheckoutSession {
            url: Some(format!("https://checkout.stripe.com/c/pay/{}", id)),
            id,
            mode: Some("subscription".to_string()),
            status: Some("open".to_string()),
            payment_status: Some("unpaid".to_string()),
            customer_id: Some(request.customer_id),
            customer_email: None,
            subscription_id: None,
            subscription: None,
            amount_total: None,
            currency: None,
            metadata: request.metadata,
        };
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        self.enter("get_checkout_session", vec![session_id.to_string()])?;
        let state = self.state();
        Ok(state.sessions.get(session_id).cloned().map(|mut session| {
            session.subscription = session
                .subscription_id
                .as_ref()
                .and_then(|id| state.subscriptions.get(id).cloned());
            session
        }))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError> {
        self.enter(
            "create_subscription",
            vec![request.customer_id.clone(), request.price_id.clone()],
        )?;
        let mut state = self.state();

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state
                .idempotency
                .get(key)
                .and_then(|id| state.subscriptions.get(id))
            {
                return Ok(existing.clone());
            }
        }

        let id = state.next_id("sub");
        let mut sub = active_subscription(&request.customer_id, &id, Timestamp::now());
        sub.price_ids = vec![request.price_id];
        sub.metadata = request.metadata;
        state.subscriptions.insert(id.clone(), sub.clone());
        if let Some(key) = request.idempotency_key {
            state.idempotency.insert(key, id);
        }
        Ok(sub)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, PaymentError> {
        self.enter("get_subscription", vec![subscription_id.to_string()])?;
        Ok(self.state().subscriptions.get(subscription_id).cloned())
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<Subscription, PaymentError> {
        self.enter(
            "update_subscription",
            vec![
                subscription_id.to_string(),
                format!("{:?}", update.cancel_at_period_end),
            ],
        )?;
        let mut state = self.state();
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        if let Some(flag) = update.cancel_at_period_end {
            sub.cancel_at_period_end = flag;
            sub.canceled_at = if flag { Some(Timestamp::now()) } else { None };
        }
        sub.metadata.extend(update.metadata);
        Ok(sub.clone())
    }

    async fn list_subscriptions(
        &self,
        query: SubscriptionQuery,
    ) -> Result<Vec<Subscription>, PaymentError> {
        self.enter(
            "list_subscriptions",
            vec![
                query.customer_id.clone().unwrap_or_default(),
                query.status.map(|s| s.to_string()).unwrap_or_default(),
            ],
        )?;
        let state = self.state();
        let mut subs: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| query.customer_id.as_deref().map_or(true, |c| s.customer_id == c))
            .filter(|s| query.status.map_or(true, |status| s.status == status))
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.recency().cmp(&a.recency()).then_with(|| a.id.cmp(&b.id)));
        subs.truncate(query.limit.max(1) as usize);
        Ok(subs)
    }

    async fn get_price(&self, price_id: &str) -> Result<Option<Price>, PaymentError> {
        self.enter("get_price", vec![price_id.to_string()])?;
        Ok(self.state().prices.get(price_id).cloned())
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, PaymentError> {
        self.enter("get_product", vec![product_id.to_string()])?;
        Ok(self.state().products.get(product_id).cloned())
    }

    async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<Product, PaymentError> {
        self.enter("create_product", vec![request.name.clone()])?;
        let mut state = self.state();

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state.idempotency.get(key).and_then(|id| state.products.get(id)) {
                return Ok(existing.clone());
            }
        }

        let product = Product {
            id: state.next_id("prod"),
            name: request.name,
            active: true,
            metadata: request.metadata,
        };
        state.products.insert(product.id.clone(), product.clone());
        if let Some(key) = request.idempotency_key {
            state.idempotency.insert(key, product.id.clone());
        }
        Ok(product)
    }

    async fn create_price(&self, request: CreatePriceRequest) -> Result<Price, PaymentError> {
        self.enter(
            "create_price",
            vec![request.product_id.clone(), request.unit_amount.to_string()],
        )?;
        let mut state = self.state();

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state.idempotency.get(key).and_then(|id| state.prices.get(id)) {
                return Ok(existing.clone());
            }
        }

        let price = Price {
            id: state.next_id("price"),
            product_id: request.product_id,
            unit_amount: Some(request.unit_amount),
            currency: request.currency,
            recurring_interval: request.recurring_interval,
            active: true,
        };
        state.prices.insert(price.id.clone(), price.clone());
        if let Some(key) = request.idempotency_key {
            state.idempotency.insert(key, price.id.clone());
        }
        Ok(price)
    }

    async fn create_coupon(&self, coupon: &NewCoupon) -> Result<Coupon, PaymentError> {
        self.enter("create_coupon", vec![coupon.name.clone()])?;
        let amount_off = coupon
            .amount_off_minor()
            .map_err(|e| PaymentError::invalid_request(e.to_string()))?;

        let mut state = self.state();
        let created = Coupon {
            id: state.next_id("coupon"),
            name: Some(coupon.name.clone()),
            percent_off: match coupon.discount_type {
                DiscountType::Percentage => Some(coupon.discount_value),
                DiscountType::Fixed => None,
            },
            amount_off,
            currency: amount_off.map(|_| coupon.currency.clone()),
            duration: match coupon.duration {
                CouponDuration::Once => "once",
                CouponDuration::Repeating => "repeating",
                CouponDuration::Forever => "forever",
            }
            .to_string(),
            duration_in_months: coupon.duration_in_months,
            max_redemptions: coupon.max_redemptions,
            times_redeemed: 0,
            redeem_by: coupon.redeem_by,
            valid: true,
        };
        state.coupons.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, PaymentError> {
        self.enter("get_coupon", vec![coupon_id.to_string()])?;
        Ok(self.state().coupons.get(coupon_id).cloned())
    }

    async fn create_promotion_code(
        &self,
        request: CreatePromotionCodeRequest,
    ) -> Result<PromotionCode, PaymentError> {
        self.enter(
            "create_promotion_code",
            vec![request.coupon_id.clone(), request.code.clone()],
        )?;
        let mut state = self.state();

        if state
            .promotion_codes
            .get(&request.code)
            .map_or(false, |existing| existing.active)
        {
            return Err(PaymentError::already_exists(format!(
                "An active promotion code with `code: {}` already exists.",
                request.code
            )));
        }
        let coupon = state
            .coupons
            .get(&request.coupon_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found("Coupon"))?;

        let code = PromotionCode {
            id: state.next_id("promo"),
            code: request.code,
            active: request.active,
            coupon,
            expires_at: request.expires_at,
            max_redemptions: request.max_redemptions,
            times_redeemed: 0,
        };
        state.promotion_codes.insert(code.code.clone(), code.clone());
        Ok(code)
    }

    async fn find_promotion_code(
        &self,
        code: &str,
    ) -> Result<Option<PromotionCode>, PaymentError> {
        self.enter("find_promotion_code", vec![code.to_string()])?;
        Ok(self.state().promotion_codes.get(code).cloned())
    }

    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Invoice>, PaymentError> {
        self.enter("list_invoices", vec![customer_id.to_string(), limit.to_string()])?;
        let state = self.state();
        let mut invoices: Vec<Invoice> = state
            .invoices
            .iter()
            .filter(|i| i.customer_id.as_deref() == Some(customer_id))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created.cmp(&a.created));
        invoices.truncate(limit as usize);
        Ok(invoices)
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<WebhookEvent>, PaymentError> {
        self.enter("list_events", query.types.clone())?;
        let state = self.state();
        let mut events: Vec<WebhookEvent> = state
            .events
            .iter()
            .filter(|e| query.types.is_empty() || query.types.iter().any(|t| t == e.event_type.as_str()))
            .filter(|e| match (query.created_after, e.created) {
                (Some(after), Some(created)) => !created.is_before(&after),
                _ => true,
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created.cmp(&a.created));
        events.truncate(query.limit.max(1) as usize);
        Ok(events)
    }

    async fn ping(&self) -> Result<(), PaymentError> {
        self.enter("ping", Vec::new())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        self.record_call("verify_webhook", vec![signature.to_string()]);
        let secret = self
            .state()
            .webhook_secret
            .clone()
            .ok_or(WebhookError::NotConfigured)?;

        let event: StripeWebhookEvent =
            StripeWebhookVerifier::new(secret).verify_and_parse(payload, signature)?;
        Ok(event.into_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::ports::PaymentErrorCode;

    fn customer_request(email: &str) -> CreateCustomerRequest {
        CreateCustomerRequest {
            user_id: UserId::new("U1").unwrap(),
            email: email.to_string(),
            name: None,
            phone: None,
            metadata: HashMap::new(),
        }
    }

    fn subscription_request(key: Option<&str>) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id: "cus_1".to_string(),
            price_id: "price_123".to_string(),
            default_payment_method: Some("pm_1".to_string()),
            metadata: HashMap::new(),
            idempotency_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_customer_stores_user_id_metadata() {
        let mock = MockPaymentProvider::new();
        let customer = mock.create_customer(customer_request("a@b.co")).await.unwrap();

        assert!(customer.id.starts_with("cus_"));
        assert_eq!(customer.user_id_hint(), Some("U1"));
        assert_eq!(mock.get_customer(&customer.id).await.unwrap(), Some(customer));
    }

    #[tokio::test]
    async fn find_customer_by_email_matches_exactly() {
        let mock = MockPaymentProvider::new();
        mock.create_customer(customer_request("a@b.co")).await.unwrap();

        assert!(mock.find_customer_by_email("a@b.co").await.unwrap().is_some());
        assert!(mock.find_customer_by_email("x@b.co").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_customer_not_found() {
        let mock = MockPaymentProvider::new();
        assert!(mock.get_customer("cus_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_subscription_collapses_on_idempotency_key() {
        let mock = MockPaymentProvider::new();
        let first = mock.create_subscription(subscription_request(Some("confirm-seti_1"))).await.unwrap();
        let second = mock.create_subscription(subscription_request(Some("confirm-seti_1"))).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(mock.subscription_count(), 1);

        mock.create_subscription(subscription_request(None)).await.unwrap();
        assert_eq!(mock.subscription_count(), 2);
    }

    #[tokio::test]
    async fn update_subscription_toggles_cancellation() {
        let mock = MockPaymentProvider::with_active_subscription("cus_1", "sub_a");

        let canceled = mock
            .update_subscription(
                "sub_a",
                SubscriptionUpdate {
                    cancel_at_period_end: Some(true),
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        assert!(canceled.cancel_at_period_end);
        assert!(canceled.canceled_at.is_some());
        assert_eq!(canceled.status, SubscriptionStatus::Active);

        let resumed = mock
            .update_subscription(
                "sub_a",
                SubscriptionUpdate {
                    cancel_at_period_end: Some(false),
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        assert!(!resumed.cancel_at_period_end);
        assert!(resumed.canceled_at.is_none());
    }

    #[tokio::test]
    async fn update_missing_subscription_is_not_found() {
        let mock = MockPaymentProvider::new();
        let err = mock
            .update_subscription("sub_missing", SubscriptionUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_subscriptions_filters_by_customer_and_status() {
        let mock = MockPaymentProvider::with_active_subscription("cus_1", "sub_a");
        let mut canceled = active_subscription("cus_1", "sub_old", Timestamp::now());
        canceled.status = SubscriptionStatus::Canceled;
        mock.add_subscription(canceled);
        mock.add_subscription(active_subscription("cus_2", "sub_b", Timestamp::now()));

        let all_for_customer = mock
            .list_subscriptions(SubscriptionQuery {
                customer_id: Some("cus_1".to_string()),
                status: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(all_for_customer.len(), 2);

        let active = mock
            .list_subscriptions(SubscriptionQuery {
                customer_id: None,
                status: Some(SubscriptionStatus::Active),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|s| s.status == SubscriptionStatus::Active));
    }

    #[tokio::test]
    async fn duplicate_promotion_code_is_rejected() {
        let mock = MockPaymentProvider::new();
        let now = Timestamp::now();
        let coupon = NewCoupon::new(
            "Spring",
            DiscountType::Percentage,
            20.0,
            CouponDuration::Once,
            None,
            None,
            None,
            None,
            None,
            now,
        )
        .unwrap();
        let coupon = mock.create_coupon(&coupon).await.unwrap();

        let request = CreatePromotionCodeRequest {
            coupon_id: coupon.id.clone(),
            code: "SPRING".to_string(),
            active: true,
            max_redemptions: None,
            expires_at: None,
            metadata: HashMap::new(),
        };
        mock.create_promotion_code(request.clone()).await.unwrap();
        let err = mock.create_promotion_code(request).await.unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::ResourceAlreadyExists);

        let found = mock.find_promotion_code("SPRING").await.unwrap().unwrap();
        assert_eq!(found.coupon.percent_off, Some(20.0));
    }

    #[tokio::test]
    async fn set_error_fails_only_the_next_call() {
        let mock = MockPaymentProvider::new();
        mock.set_error(PaymentError::network("reset"));

        assert!(mock.ping().await.is_err());
        assert!(mock.ping().await.is_ok());
    }

    #[tokio::test]
    async fn set_method_error_only_affects_method() {
        let mock = MockPaymentProvider::new();
        mock.set_method_error("create_subscription", PaymentError::card_declined("declined"));

        let err = mock.create_subscription(subscription_request(None)).await.unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::CardDeclined);
        assert!(mock.ping().await.is_ok());

        mock.clear_errors();
        assert!(mock.create_subscription(subscription_request(None)).await.is_ok());
    }

    #[tokio::test]
    async fn tracks_method_calls() {
        let mock = MockPaymentProvider::new();
        mock.get_customer("cus_1").await.unwrap();
        mock.get_customer("cus_2").await.unwrap();

        assert!(mock.was_called("get_customer"));
        assert_eq!(mock.call_count("get_customer"), 2);
        assert_eq!(mock.calls()[1].args, vec!["cus_2".to_string()]);

        mock.clear_calls();
        assert!(!mock.was_called("get_customer"));
    }

    #[tokio::test]
    async fn checkout_completion_expands_subscription() {
        let mock = MockPaymentProvider::new();
        let session = mock
            .create_checkout_session(CreateCheckoutRequest {
                customer_id: "cus_1".to_string(),
                price_id: "price_123".to_string(),
                success_url: "https://app/success".to_string(),
                cancel_url: "https://app/cancel".to_string(),
                metadata: HashMap::new(),
                discount: crate::ports::CheckoutDiscount::AllowPromotionCodes,
            })
            .await
            .unwrap();
        mock.complete_checkout(&session.id, "sub_new");

        let fetched = mock.get_checkout_session(&session.id).await.unwrap().unwrap();
        assert!(fetched.is_paid());
        assert_eq!(fetched.subscription.unwrap().id, "sub_new");
    }

    #[test]
    fn verify_webhook_uses_configured_secret() {
        let mock = MockPaymentProvider::new().with_webhook_secret("whsec_mock");
        let payload = br#"{"id":"evt_1","type":"customer.created","data":{"object":{"id":"cus_1","object":"customer"}}}"#;
        let header = mock.sign(payload).unwrap();

        let event = mock.verify_webhook(payload, &header).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(
            mock.verify_webhook(payload, "invalid"),
            Err(WebhookError::ParseError("invalid header format".to_string()))
        );
    }

    #[test]
    fn verify_webhook_without_secret_is_not_configured() {
        let mock = MockPaymentProvider::new();
        assert_eq!(
            mock.verify_webhook(b"{}", "t=1,v1=00"),
            Err(WebhookError::NotConfigured)
        );
    }
}
