//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` trait over Stripe's REST API.
//! Requests are form-encoded with basic auth; writes carry an
//! `Idempotency-Key` header when the caller supplies one.
//!
//! # Security
//!
//! - Webhook signatures are checked by `StripeWebhookVerifier`
//! - Live keys reject test-mode webhook events
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_webhook_secret(secret);
//! let adapter = StripePaymentAdapter::new(config);
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::subscription::{
    CouponDuration, DiscountType, NewCoupon, StripeWebhookVerifier, Subscription, WebhookError,
    METADATA_USER_ID,
};
use crate::domain::subscription::{Coupon, PromotionCode};
use crate::ports::{
    CheckoutDiscount, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest,
    CreatePriceRequest, CreateProductRequest, CreatePromotionCodeRequest,
    CreateSetupIntentRequest, CreateSubscriptionRequest, Customer, EventQuery, Intent, IntentKind,
    Invoice, PaymentError, PaymentProvider, Price, Product, SubscriptionQuery, SubscriptionUpdate,
    WebhookEvent,
};

use super::webhook_types::{
    StripeCheckoutSession, StripeCoupon, StripeCustomer, StripeEphemeralKey, StripeErrorBody,
    StripeIntent, StripeInvoice, StripeList, StripePrice, StripeProduct, StripePromotionCode,
    StripeSubscription, StripeWebhookEvent,
};

/// Default Stripe API host.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// API version pinned on every request. Ephemeral keys require one.
const STRIPE_API_VERSION: &str = "2024-06-20";

type FormParams = Vec<(String, String)>;

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_..., sk_test_... or rk_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...). Webhooks answer 503 without it.
    webhook_secret: Option<SecretString>,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test-mode webhook events.
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a new Stripe configuration. Live keys require livemode events.
    pub fn new(api_key: SecretString) -> Self {
        let require_livemode = api_key.expose_secret().contains("_live_");
        Self {
            api_key,
            webhook_secret: None,
            api_base_url: DEFAULT_API_BASE.to_string(),
            require_livemode,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<SecretString>) -> Self {
        self.webhook_secret = secret;
        self
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_base_url", &self.api_base_url)
            .field("require_livemode", &self.require_livemode)
            .finish()
    }
}

/// Stripe payment provider adapter.
///
/// Implements `PaymentProvider` for Stripe API integration.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    verifier: Option<StripeWebhookVerifier>,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    /// Create a new Stripe adapter with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create an adapter sharing an existing HTTP client.
    pub fn with_client(config: StripeConfig, http_client: reqwest::Client) -> Self {
        let verifier = config
            .webhook_secret
            .as_ref()
            .map(|secret| StripeWebhookVerifier::new(secret.expose_secret().clone()));
        Self {
            config,
            verifier,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    /// GET a resource. A missing resource is `Ok(None)`.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<T>, PaymentError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Stripe-Version", STRIPE_API_VERSION)
            .query(query)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        match read_response(response, path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET a list endpoint.
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>, PaymentError> {
        let list: Option<StripeList<T>> = self.get(path, query).await?;
        Ok(list.map(|l| l.data).unwrap_or_default())
    }

    /// POST a form. Missing resources are errors here.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &FormParams,
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Stripe-Version", STRIPE_API_VERSION)
            .form(params);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        read_response(response, path).await
    }
}

/// Decodes a success body, or classifies Stripe's error body.
async fn read_response<T: DeserializeOwned>(
    response: reqwest::Response,
    path: &str,
) -> Result<T, PaymentError> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<StripeErrorBody>(&error_text) {
            Ok(body) => body.error.into_payment_error(status.as_u16()),
            Err(_) => StripeErrorBody::fallback(status.as_u16(), &error_text),
        };
        if err.is_not_found() {
            tracing::debug!(path = %path, "Stripe resource missing");
        } else {
            tracing::error!(path = %path, status = status.as_u16(), error = %err, "Stripe API error");
        }
        return Err(err);
    }

    response.json().await.map_err(|e| {
        PaymentError::decode(format!("Failed to parse Stripe response: {}", e))
    })
}

impl StripeErrorBody {
    fn fallback(status: u16, text: &str) -> PaymentError {
        super::webhook_types::StripeErrorDetail {
            error_type: None,
            code: None,
            decline_code: None,
            message: Some(format!("Stripe API error: {}", text)),
            param: None,
        }
        .into_payment_error(status)
    }
}

fn push_metadata(params: &mut FormParams, prefix: &str, metadata: &HashMap<String, String>) {
    let mut entries: Vec<_> = metadata.iter().collect();
    entries.sort();
    for (key, value) in entries {
        params.push((format!("{}[{}]", prefix, key), value.clone()));
    }
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn coupon_params(coupon: &NewCoupon) -> Result<FormParams, PaymentError> {
    let mut params = vec![
        param("name", &coupon.name),
        param(
            "duration",
            match coupon.duration {
                CouponDuration::Once => "once",
                CouponDuration::Repeating => "repeating",
                CouponDuration::Forever => "forever",
            },
        ),
    ];

    match coupon.discount_type {
        DiscountType::Percentage => params.push(param("percent_off", coupon.discount_value)),
        DiscountType::Fixed => {
            let amount = coupon
                .amount_off_minor()
                .map_err(|e| PaymentError::invalid_request(e.to_string()))?
                .unwrap_or_default();
            params.push(param("amount_off", amount));
            params.push(param("currency", &coupon.currency));
        }
    }

    if let Some(months) = coupon.duration_in_months {
        params.push(param("duration_in_months", months));
    }
    if let Some(redeem_by) = coupon.redeem_by {
        params.push(param("redeem_by", redeem_by.as_unix()));
    }
    if let Some(max) = coupon.max_redemptions {
        params.push(param("max_redemptions", max));
    }
    if let Some(promotion_id) = &coupon.promotion_id {
        params.push(param("metadata[promotionId]", promotion_id));
    }
    Ok(params)
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut params = vec![
            param("email", &request.email),
            param(&format!("metadata[{}]", METADATA_USER_ID), request.user_id.as_str()),
        ];
        if let Some(name) = &request.name {
            params.push(param("name", name));
        }
        if let Some(phone) = &request.phone {
            params.push(param("phone", phone));
        }
        let mut extra = request.metadata.clone();
        extra.remove(METADATA_USER_ID);
        push_metadata(&mut params, "metadata", &extra);

        let customer: StripeCustomer = self.post("customers", &params, None).await?;
        tracing::info!(customer_id = %customer.id, user_id = %request.user_id, "Stripe customer created");
        Ok(customer.into_domain())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, PaymentError> {
        let customer: Option<StripeCustomer> =
            self.get(&format!("customers/{}", customer_id), &[]).await?;
        Ok(customer.filter(|c| !c.deleted).map(StripeCustomer::into_domain))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, PaymentError> {
        let customers: Vec<StripeCustomer> = self
            .list("customers", &[param("email", email), param("limit", 1)])
            .await?;
        Ok(customers
            .into_iter()
            .find(|c| !c.deleted)
            .map(StripeCustomer::into_domain))
    }

    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<String, PaymentError> {
        let key: StripeEphemeralKey = self
            .post("ephemeral_keys", &vec![param("customer", customer_id)], None)
            .await?;
        Ok(key.secret)
    }

    async fn create_setup_intent(
        &self,
        request: CreateSetupIntentRequest,
    ) -> Result<Intent, PaymentError> {
        let mut params = vec![
            param("customer", &request.customer_id),
            param("usage", "off_session"),
            param("automatic_payment_methods[enabled]", true),
        ];
        push_metadata(&mut params, "metadata", &request.metadata);

        let intent: StripeIntent = self.post("setup_intents", &params, None).await?;
        Ok(intent.into_domain())
    }

    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, PaymentError> {
        let path = match IntentKind::from_id(intent_id) {
            Some(IntentKind::Setup) => format!("setup_intents/{}", intent_id),
            Some(IntentKind::Payment) => format!("payment_intents/{}", intent_id),
            None => {
                return Err(PaymentError::invalid_request(format!(
                    "Unrecognized intent id: {}",
                    intent_id
                )))
            }
        };
        let intent: Option<StripeIntent> = self.get(&path, &[]).await?;
        Ok(intent.map(StripeIntent::into_domain))
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut params = vec![
            param("mode", "subscription"),
            param("customer", &request.customer_id),
            param("line_items[0][price]", &request.price_id),
            param("line_items[0][quantity]", 1),
            param("success_url", &request.success_url),
            param("cancel_url", &request.cancel_url),
        ];
        push_metadata(&mut params, "metadata", &request.metadata);
        push_metadata(&mut params, "subscription_data[metadata]", &request.metadata);

        match &request.discount {
            CheckoutDiscount::AllowPromotionCodes => {
                params.push(param("allow_promotion_codes", true))
            }
            CheckoutDiscount::Coupon(coupon) => params.push(param("discounts[0][coupon]", coupon)),
            CheckoutDiscount::PromotionCode(code) => {
                params.push(param("discounts[0][promotion_code]", code))
            }
        }

        let session: StripeCheckoutSession =
            self.post("checkout/sessions", &params, None).await?;
        session.into_domain()
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        let session: Option<StripeCheckoutSession> = self
            .get(
                &format!("checkout/sessions/{}", session_id),
                &[param("expand[]", "subscription")],
            )
            .await?;
        session.map(StripeCheckoutSession::into_domain).transpose()
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError> {
        let mut params = vec![
            param("customer", &request.customer_id),
            param("items[0][price]", &request.price_id),
            param("payment_behavior", "error_if_incomplete"),
        ];
        if let Some(pm) = &request.default_payment_method {
            params.push(param("default_payment_method", pm));
        }
        push_metadata(&mut params, "metadata", &request.metadata);

        let sub: StripeSubscription = self
            .post("subscriptions", &params, request.idempotency_key.as_deref())
            .await?;
        sub.into_domain()
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, PaymentError> {
        let sub: Option<StripeSubscription> = self
            .get(&format!("subscriptions/{}", subscription_id), &[])
            .await?;
        sub.map(StripeSubscription::into_domain).transpose()
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<Subscription, PaymentError> {
        let mut params = Vec::new();
        if let Some(flag) = update.cancel_at_period_end {
            params.push(param("cancel_at_period_end", flag));
        }
        push_metadata(&mut params, "metadata", &update.metadata);

        let sub: StripeSubscription = self
            .post(&format!("subscriptions/{}", subscription_id), &params, None)
            .await?;
        sub.into_domain()
    }

    async fn list_subscriptions(
        &self,
        query: SubscriptionQuery,
    ) -> Result<Vec<Subscription>, PaymentError> {
        let mut params = vec![
            param("status", query.status.map_or("all", |s| s.as_str())),
            param("limit", query.limit.clamp(1, 100)),
        ];
        if let Some(customer) = &query.customer_id {
            params.push(param("customer", customer));
        }

        let subs: Vec<StripeSubscription> = self.list("subscriptions", &params).await?;
        subs.into_iter().map(StripeSubscription::into_domain).collect()
    }

    async fn get_price(&self, price_id: &str) -> Result<Option<Price>, PaymentError> {
        let price: Option<StripePrice> = self.get(&format!("prices/{}", price_id), &[]).await?;
        Ok(price.map(StripePrice::into_domain))
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, PaymentError> {
        let product: Option<StripeProduct> =
            self.get(&format!("products/{}", product_id), &[]).await?;
        Ok(product.filter(|p| !p.deleted).map(StripeProduct::into_domain))
    }

    async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<Product, PaymentError> {
        let mut params = vec![param("name", &request.name)];
        if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
            params.push(param("description", description));
        }
        push_metadata(&mut params, "metadata", &request.metadata);

        let product: StripeProduct = self
            .post("products", &params, request.idempotency_key.as_deref())
            .await?;
        Ok(product.into_domain())
    }

    async fn create_price(&self, request: CreatePriceRequest) -> Result<Price, PaymentError> {
        let mut params = vec![
            param("product", &request.product_id),
            param("unit_amount", request.unit_amount),
            param("currency", &request.currency),
        ];
        if let Some(interval) = &request.recurring_interval {
            params.push(param("recurring[interval]", interval));
        }
        if let Some(nickname) = &request.nickname {
            params.push(param("nickname", nickname));
        }
        push_metadata(&mut params, "metadata", &request.metadata);

        let price: StripePrice = self
            .post("prices", &params, request.idempotency_key.as_deref())
            .await?;
        Ok(price.into_domain())
    }

    async fn create_coupon(&self, coupon: &NewCoupon) -> Result<Coupon, PaymentError> {
        let params = coupon_params(coupon)?;
        let created: StripeCoupon = self.post("coupons", &params, None).await?;
        Ok(created.into_domain())
    }

    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, PaymentError> {
        let coupon: Option<StripeCoupon> =
            self.get(&format!("coupons/{}", coupon_id), &[]).await?;
        Ok(coupon.map(StripeCoupon::into_domain))
    }

    async fn create_promotion_code(
        &self,
        request: CreatePromotionCodeRequest,
    ) -> Result<PromotionCode, PaymentError> {
        let mut params = vec![
            param("coupon", &request.coupon_id),
            param("code", &request.code),
            param("active", request.active),
        ];
        if let Some(max) = request.max_redemptions {
            params.push(param("max_redemptions", max));
        }
        if let Some(expires_at) = request.expires_at {
            params.push(param("expires_at", expires_at.as_unix()));
        }
        push_metadata(&mut params, "metadata", &request.metadata);

        let code: StripePromotionCode = self.post("promotion_codes", &params, None).await?;
        Ok(code.into_domain())
    }

    async fn find_promotion_code(
        &self,
        code: &str,
    ) -> Result<Option<PromotionCode>, PaymentError> {
        let codes: Vec<StripePromotionCode> = self
            .list("promotion_codes", &[param("code", code), param("limit", 1)])
            .await?;
        Ok(codes.into_iter().next().map(StripePromotionCode::into_domain))
    }

    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Invoice>, PaymentError> {
        let invoices: Vec<StripeInvoice> = self
            .list(
                "invoices",
                &[param("customer", customer_id), param("limit", limit.clamp(1, 100))],
            )
            .await?;
        Ok(invoices.into_iter().map(StripeInvoice::into_domain).collect())
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<WebhookEvent>, PaymentError> {
        let mut params = vec![param("limit", query.limit.clamp(1, 100))];
        for event_type in &query.types {
            params.push(param("types[]", event_type));
        }
        if let Some(after) = query.created_after {
            params.push(param("created[gte]", after.as_unix()));
        }

        let events: Vec<StripeWebhookEvent> = self.list("events", &params).await?;
        Ok(events
            .into_iter()
            .map(StripeWebhookEvent::into_domain)
            .collect())
    }

    async fn ping(&self) -> Result<(), PaymentError> {
        let _: Vec<StripeProduct> = self.list("products", &[param("limit", 1)]).await?;
        Ok(())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        let verifier = self.verifier.as_ref().ok_or(WebhookError::NotConfigured)?;
        let event: StripeWebhookEvent = verifier.verify_and_parse(payload, signature)?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event for a live key");
            return Err(WebhookError::ParseError(
                "Test mode events not allowed with a live key".to_string(),
            ));
        }

        Ok(event.into_domain())
    }
}
