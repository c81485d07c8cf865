//! Payment provider port for Stripe.
//!
//! Defines the capability surface the reconciliation engine consumes:
//! customers, intents, checkout sessions, subscriptions, catalog, discounts,
//! invoices, event enumeration and webhook verification.
//!
//! # Design
//!
//! - **Typed results**: wire JSON never crosses this seam
//! - **Closed error set**: every failure is a `PaymentError` with a code
//! - **Idempotent writes**: write requests carry an optional idempotency key

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    BillingError, Coupon, NewCoupon, PromotionCode, Subscription, SubscriptionStatus,
    WebhookError,
};

/// Port for the external payment processor.
///
/// Lookups return `Ok(None)` when the resource does not exist, so callers
/// can tell "missing" apart from transport failures.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer. Our user id is stored as `metadata.userId`.
    async fn create_customer(&self, request: CreateCustomerRequest)
        -> Result<Customer, PaymentError>;

    /// Get customer by id. Deleted customers are reported as `None`.
    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, PaymentError>;

    /// Find the first customer with this email.
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, PaymentError>;

    /// Create an ephemeral key for the mobile payment sheet. Returns its secret.
    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<String, PaymentError>;

    /// Create a SetupIntent that saves a payment method off-session.
    async fn create_setup_intent(
        &self,
        request: CreateSetupIntentRequest,
    ) -> Result<Intent, PaymentError>;

    /// Retrieve a SetupIntent (`seti_`) or PaymentIntent (`pi_`) by id.
    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, PaymentError>;

    /// Create a hosted checkout session in subscription mode.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Retrieve a checkout session with its subscription expanded.
    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, PaymentError>;

    /// Create a subscription with `payment_behavior=error_if_incomplete`.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError>;

    /// Get subscription by id.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, PaymentError>;

    /// Update cancellation flag and metadata of a subscription.
    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<Subscription, PaymentError>;

    /// List subscriptions, newest first.
    async fn list_subscriptions(
        &self,
        query: SubscriptionQuery,
    ) -> Result<Vec<Subscription>, PaymentError>;

    /// Get a price by id.
    async fn get_price(&self, price_id: &str) -> Result<Option<Price>, PaymentError>;

    /// Get a product by id.
    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, PaymentError>;

    /// Create a product. Retries with the same idempotency key collapse.
    async fn create_product(&self, request: CreateProductRequest)
        -> Result<Product, PaymentError>;

    /// Create a price. Retries with the same idempotency key collapse.
    async fn create_price(&self, request: CreatePriceRequest) -> Result<Price, PaymentError>;

    /// Create a coupon.
    async fn create_coupon(&self, coupon: &NewCoupon) -> Result<Coupon, PaymentError>;

    /// Get a coupon by id.
    async fn get_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>, PaymentError>;

    /// Create a customer-facing promotion code for a coupon.
    ///
    /// A code that already exists fails with `ResourceAlreadyExists`.
    async fn create_promotion_code(
        &self,
        request: CreatePromotionCodeRequest,
    ) -> Result<PromotionCode, PaymentError>;

    /// Find a promotion code by its customer-facing code.
    async fn find_promotion_code(&self, code: &str)
        -> Result<Option<PromotionCode>, PaymentError>;

    /// List a customer's invoices, newest first.
    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Invoice>, PaymentError>;

    /// List recent events, newest first.
    async fn list_events(&self, query: EventQuery) -> Result<Vec<WebhookEvent>, PaymentError>;

    /// Cheap authenticated call used by readiness probes.
    async fn ping(&self) -> Result<(), PaymentError>;

    /// Verify a webhook signature against the raw body and parse the event.
    fn verify_webhook(&self, payload: &[u8], signature: &str)
        -> Result<WebhookEvent, WebhookError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// Customers and intents
// ════════════════════════════════════════════════════════════════════════════════

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Internal user ID (stored as metadata).
    pub user_id: UserId,

    /// Customer email address.
    pub email: String,

    pub name: Option<String>,

    pub phone: Option<String>,

    /// Extra metadata supplied by the caller.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Customer in the payment system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Provider's customer ID.
    pub id: String,

    pub email: Option<String>,

    pub name: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Customer {
    /// User id recorded when the customer was created, if any.
    pub fn user_id_hint(&self) -> Option<&str> {
        self.metadata
            .get(crate::domain::subscription::METADATA_USER_ID)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Request to create a SetupIntent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSetupIntentRequest {
    pub customer_id: String,
    pub metadata: HashMap<String, String>,
}

/// SetupIntent or PaymentIntent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Setup,
    Payment,
}

impl IntentKind {
    /// Classifies an intent id by its Stripe prefix.
    pub fn from_id(intent_id: &str) -> Option<Self> {
        if intent_id.starts_with("seti_") {
            Some(IntentKind::Setup)
        } else if intent_id.starts_with("pi_") {
            Some(IntentKind::Payment)
        } else {
            None
        }
    }
}

/// A SetupIntent or PaymentIntent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub kind: IntentKind,
    pub status: String,
    pub client_secret: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Intent {
    pub fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout and subscriptions
// ════════════════════════════════════════════════════════════════════════════════

/// Discount applied to a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutDiscount {
    /// No discount preset; customers may type a promotion code.
    AllowPromotionCodes,
    Coupon(String),
    PromotionCode(String),
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Stored on the session and copied onto the subscription.
    pub metadata: HashMap<String, String>,
    pub discount: CheckoutDiscount,
}

/// Checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub mode: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub subscription_id: Option<String>,
    /// Present when the subscription was expanded.
    pub subscription: Option<Subscription>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    pub fn is_subscription_mode(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }

    pub fn user_id_hint(&self) -> Option<&str> {
        self.metadata
            .get(crate::domain::subscription::METADATA_USER_ID)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Request to create a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub default_payment_method: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Fields changed on an existing subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    pub cancel_at_period_end: Option<bool>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Filter for listing subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionQuery {
    pub customer_id: Option<String>,
    /// `None` lists every status, including canceled.
    pub status: Option<SubscriptionStatus>,
    pub limit: u32,
}

// ════════════════════════════════════════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════════════════════════════════════════

/// Product in the payment catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Price in the payment catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub product_id: String,
    /// Minor units.
    pub unit_amount: Option<i64>,
    pub currency: String,
    /// `week`, `month` or `year`; `None` for one-off prices.
    pub recurring_interval: Option<String>,
    pub active: bool,
}

/// Request to create a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// Request to create a price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePriceRequest {
    pub product_id: String,
    /// Minor units.
    pub unit_amount: i64,
    pub currency: String,
    pub recurring_interval: Option<String>,
    pub nickname: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// Request to create a promotion code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePromotionCodeRequest {
    pub coupon_id: String,
    pub code: String,
    pub active: bool,
    pub max_redemptions: Option<u32>,
    pub expires_at: Option<Timestamp>,
    pub metadata: HashMap<String, String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Invoices and events
// ════════════════════════════════════════════════════════════════════════════════

/// Invoice issued to a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub number: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Minor units.
    pub amount_paid: i64,
    pub currency: String,
    pub status: Option<String>,
    pub created: Option<Timestamp>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
}

/// Filter for listing events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    pub types: Vec<String>,
    pub created_after: Option<Timestamp>,
    pub limit: u32,
}

/// Webhook event from the payment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider.
    pub id: String,

    pub event_type: WebhookEventType,

    pub data: WebhookEventData,

    pub created: Option<Timestamp>,
}

/// Types of webhook events we handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    CheckoutSessionCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    CustomerCreated,
    CustomerUpdated,
    Unknown(String),
}

impl WebhookEventType {
    /// Every event type this service acts on, by Stripe name.
    pub const HANDLED: [&'static str; 8] = [
        "checkout.session.completed",
        "customer.subscription.created",
        "customer.subscription.updated",
        "customer.subscription.deleted",
        "invoice.payment_succeeded",
        "invoice.payment_failed",
        "customer.created",
        "customer.updated",
    ];

    pub fn parse(value: &str) -> Self {
        match value {
            "checkout.session.completed" => WebhookEventType::CheckoutSessionCompleted,
            "customer.subscription.created" => WebhookEventType::SubscriptionCreated,
            "customer.subscription.updated" => WebhookEventType::SubscriptionUpdated,
            "customer.subscription.deleted" => WebhookEventType::SubscriptionDeleted,
            "invoice.payment_succeeded" => WebhookEventType::InvoicePaymentSucceeded,
            "invoice.payment_failed" => WebhookEventType::InvoicePaymentFailed,
            "customer.created" => WebhookEventType::CustomerCreated,
            "customer.updated" => WebhookEventType::CustomerUpdated,
            other => WebhookEventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::CheckoutSessionCompleted => "checkout.session.completed",
            WebhookEventType::SubscriptionCreated => "customer.subscription.created",
            WebhookEventType::SubscriptionUpdated => "customer.subscription.updated",
            WebhookEventType::SubscriptionDeleted => "customer.subscription.deleted",
            WebhookEventType::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            WebhookEventType::InvoicePaymentFailed => "invoice.payment_failed",
            WebhookEventType::CustomerCreated => "customer.created",
            WebhookEventType::CustomerUpdated => "customer.updated",
            WebhookEventType::Unknown(other) => other,
        }
    }
}

/// Webhook event payload, typed by object kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WebhookEventData {
    Subscription(Subscription),
    Invoice(Invoice),
    CheckoutSession(CheckoutSession),
    Customer(Customer),
    /// Object kinds this service does not interpret.
    Raw(serde_json::Value),
    /// A handled event whose object could not be decoded.
    Malformed(String),
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    /// Create a card declined error.
    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::CardDeclined, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
            .with_provider_code("resource_missing")
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message)
    }

    /// Create a duplicate resource error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ResourceAlreadyExists, message)
            .with_provider_code("resource_already_exists")
    }

    /// Create a decode error for a response we could not interpret.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    /// Returns true if the provider reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.code == PaymentErrorCode::NotFound
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::CardDeclined => BillingError::PaymentRejected(err.message),
            PaymentErrorCode::NotFound => BillingError::not_found("Payment resource", err.message),
            PaymentErrorCode::InvalidRequest => BillingError::validation("request", err.message),
            PaymentErrorCode::ResourceAlreadyExists => BillingError::DuplicateCode(err.message),
            PaymentErrorCode::InvalidWebhook => BillingError::BadSignature(err.message),
            _ => BillingError::Upstream(err.to_string()),
        }
    }
}

impl From<WebhookError> for BillingError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::NotConfigured => BillingError::initialization(err.to_string()),
            other => BillingError::BadSignature(other.to_string()),
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Card was declined, or the first payment could not complete.
    CardDeclined,

    /// Resource not found (`resource_missing`).
    NotFound,

    /// Request parameters were rejected.
    InvalidRequest,

    /// A resource with the same unique key already exists.
    ResourceAlreadyExists,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Invalid webhook signature.
    InvalidWebhook,

    /// Provider API error.
    ProviderError,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::CardDeclined => "card_declined",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::ResourceAlreadyExists => "resource_already_exists",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidWebhook => "invalid_webhook",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
