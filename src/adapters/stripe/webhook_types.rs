//! Stripe wire types.
//!
//! These types represent Stripe API objects as they arrive in API responses
//! and webhook payloads. They are designed to:
//! - Parse actual Stripe JSON accurately, including expandable fields
//! - Convert to port/domain types before leaving the adapter
//! - Clamp epoch-second fields through `Timestamp::from_unix`

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{Coupon, PromotionCode, Subscription, SubscriptionStatus};
use crate::ports::{
    CheckoutSession, Customer, Intent, IntentKind, Invoice, PaymentError, PaymentErrorCode,
    Price, Product, WebhookEvent, WebhookEventData, WebhookEventType,
};

// ════════════════════════════════════════════════════════════════════════════════
// Envelope helpers
// ════════════════════════════════════════════════════════════════════════════════

/// A field Stripe returns either as an id or, when expanded, as the object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

/// Anything that carries a Stripe id.
pub trait HasId {
    fn id(&self) -> &str;
}

impl<T: HasId> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id(),
        }
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(*obj),
        }
    }
}

/// Minimal object used when only the id of an expandable matters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeRef {
    pub id: String,
}

impl HasId for StripeRef {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Stripe list envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeErrorBody {
    pub error: StripeErrorDetail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeErrorDetail {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
}

impl StripeErrorDetail {
    /// Classifies a Stripe error by HTTP status, type and code.
    pub fn into_payment_error(self, status: u16) -> PaymentError {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| format!("Stripe returned HTTP {}", status));
        let already_exists = self.code.as_deref() == Some("resource_already_exists")
            || message.contains("already exists");

        let code = match (status, self.error_type.as_deref(), self.code.as_deref()) {
            (_, _, Some("resource_missing")) | (404, _, _) => PaymentErrorCode::NotFound,
            _ if already_exists => PaymentErrorCode::ResourceAlreadyExists,
            (_, Some("card_error"), _) | (402, _, _) => PaymentErrorCode::CardDeclined,
            (401, _, _) | (403, _, _) => PaymentErrorCode::AuthenticationError,
            (429, _, _) => PaymentErrorCode::RateLimitExceeded,
            (400, _, _) | (_, Some("invalid_request_error"), _) => PaymentErrorCode::InvalidRequest,
            _ => PaymentErrorCode::ProviderError,
        };

        let err = PaymentError::new(code, message);
        match self.code.or(self.decline_code) {
            Some(provider_code) => err.with_provider_code(provider_code),
            None => err,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Event Types
// ════════════════════════════════════════════════════════════════════════════════

/// Raw Stripe event as received from webhooks or `/v1/events`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    #[serde(default)]
    pub created: Option<i64>,

    /// Event payload containing the affected object.
    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

impl StripeWebhookEvent {
    /// Converts the envelope, typing `data.object` by its `object` field.
    ///
    /// Only event types the service handles are decoded. A handled event whose
    /// object does not decode becomes `Malformed` rather than an error, since
    /// the envelope was already verified.
    pub fn into_domain(self) -> WebhookEvent {
        let event_type = WebhookEventType::parse(&self.event_type);
        let data = match event_type {
            WebhookEventType::Unknown(_) => WebhookEventData::Raw(self.data.object),
            _ => decode_object(self.data.object)
                .unwrap_or_else(|e| WebhookEventData::Malformed(e.message)),
        };

        WebhookEvent {
            id: self.id,
            event_type,
            data,
            created: Timestamp::from_unix(self.created),
        }
    }
}

fn decode_object(object: serde_json::Value) -> Result<WebhookEventData, PaymentError> {
    let kind = object
        .get("object")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(match kind.as_str() {
        "subscription" => WebhookEventData::Subscription(
            decode::<StripeSubscription>(object, "subscription")?.into_domain()?,
        ),
        "invoice" => {
            WebhookEventData::Invoice(decode::<StripeInvoice>(object, "invoice")?.into_domain())
        }
        "checkout.session" => WebhookEventData::CheckoutSession(
            decode::<StripeCheckoutSession>(object, "checkout session")?.into_domain()?,
        ),
        "customer" => {
            WebhookEventData::Customer(decode::<StripeCustomer>(object, "customer")?.into_domain())
        }
        _ => WebhookEventData::Raw(object),
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, PaymentError> {
    serde_json::from_value(value)
        .map_err(|e| PaymentError::decode(format!("Invalid {} object: {}", what, e)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    pub email: Option<String>,

    pub name: Option<String>,

    /// Set on the stub Stripe returns for deleted customers.
    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl HasId for StripeCustomer {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StripeCustomer {
    pub fn into_domain(self) -> Customer {
        Customer {
            id: self.id,
            email: self.email,
            name: self.name,
            metadata: self.metadata,
        }
    }
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    pub customer: Expandable<StripeRef>,

    /// Wire status string; parsed during conversion.
    pub status: String,

    pub current_period_start: Option<i64>,

    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    pub canceled_at: Option<i64>,

    pub start_date: Option<i64>,

    pub created: Option<i64>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
}

impl HasId for StripeSubscription {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Subscription line item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    pub id: Option<String>,
    pub price: Option<StripePrice>,
    /// Newer API versions carry period bounds per item.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    /// Converts to the projector's view. Unknown statuses are an upstream fault.
    pub fn into_domain(self) -> Result<Subscription, PaymentError> {
        let status = SubscriptionStatus::parse(&self.status).ok_or_else(|| {
            PaymentError::decode(format!("Unknown subscription status: {}", self.status))
        })?;

        let first_item = self.items.data.first();
        let period_start = self
            .current_period_start
            .or_else(|| first_item.and_then(|i| i.current_period_start));
        let period_end = self
            .current_period_end
            .or_else(|| first_item.and_then(|i| i.current_period_end));

        Ok(Subscription {
            customer_id: self.customer.id().to_string(),
            status,
            current_period_start: Timestamp::from_unix(period_start),
            current_period_end: Timestamp::from_unix(period_end),
            cancel_at_period_end: self.cancel_at_period_end,
            canceled_at: Timestamp::from_unix(self.canceled_at),
            start_date: Timestamp::from_unix(self.start_date),
            created: Timestamp::from_unix(self.created),
            price_ids: self
                .items
                .data
                .iter()
                .filter_map(|item| item.price.as_ref().map(|p| p.id.clone()))
                .collect(),
            metadata: self.metadata,
            id: self.id,
        })
    }
}

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    pub url: Option<String>,

    /// Payment mode (payment, setup, subscription).
    pub mode: Option<String>,

    /// Session status (open, complete, expired).
    pub status: Option<String>,

    pub payment_status: Option<String>,

    pub customer: Option<Expandable<StripeRef>>,

    pub customer_email: Option<String>,

    pub customer_details: Option<StripeCustomerDetails>,

    /// Subscription id, or the object when expanded.
    pub subscription: Option<Expandable<StripeSubscription>>,

    pub amount_total: Option<i64>,

    pub currency: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

impl StripeCheckoutSession {
    pub fn into_domain(self) -> Result<CheckoutSession, PaymentError> {
        let subscription_id = self.subscription.as_ref().map(|s| s.id().to_string());
        let subscription = match self.subscription.and_then(Expandable::into_object) {
            Some(sub) => Some(sub.into_domain()?),
            None => None,
        };

        Ok(CheckoutSession {
            id: self.id,
            url: self.url,
            mode: self.mode,
            status: self.status,
            payment_status: self.payment_status,
            customer_id: self.customer.map(|c| c.id().to_string()),
            customer_email: self
                .customer_email
                .or_else(|| self.customer_details.and_then(|d| d.email)),
            subscription_id,
            subscription,
            amount_total: self.amount_total,
            currency: self.currency,
            metadata: self.metadata,
        })
    }
}

/// Stripe Invoice object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    pub number: Option<String>,

    pub customer: Option<Expandable<StripeRef>>,

    pub subscription: Option<Expandable<StripeRef>>,

    /// Newer API versions move the subscription under `parent`.
    pub parent: Option<serde_json::Value>,

    #[serde(default)]
    pub amount_paid: i64,

    #[serde(default)]
    pub currency: String,

    pub status: Option<String>,

    pub created: Option<i64>,

    pub period_start: Option<i64>,

    pub period_end: Option<i64>,

    pub hosted_invoice_url: Option<String>,

    pub invoice_pdf: Option<String>,
}

impl StripeInvoice {
    pub fn subscription_id(&self) -> Option<String> {
        self.subscription
            .as_ref()
            .map(|s| s.id().to_string())
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.pointer("/subscription_details/subscription"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
    }

    pub fn into_domain(self) -> Invoice {
        Invoice {
            subscription_id: self.subscription_id(),
            id: self.id,
            number: self.number,
            customer_id: self.customer.map(|c| c.id().to_string()),
            amount_paid: self.amount_paid,
            currency: self.currency,
            status: self.status,
            created: Timestamp::from_unix(self.created),
            period_start: Timestamp::from_unix(self.period_start),
            period_end: Timestamp::from_unix(self.period_end),
            hosted_invoice_url: self.hosted_invoice_url,
            invoice_pdf: self.invoice_pdf,
        }
    }
}

/// SetupIntent or PaymentIntent object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeIntent {
    pub id: String,
    /// `setup_intent` or `payment_intent`.
    pub object: String,
    pub status: String,
    pub client_secret: Option<String>,
    pub customer: Option<Expandable<StripeRef>>,
    pub payment_method: Option<Expandable<StripeRef>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeIntent {
    pub fn into_domain(self) -> Intent {
        let kind = if self.object == "setup_intent" {
            IntentKind::Setup
        } else {
            IntentKind::Payment
        };
        Intent {
            id: self.id,
            kind,
            status: self.status,
            client_secret: self.client_secret,
            customer_id: self.customer.map(|c| c.id().to_string()),
            payment_method: self.payment_method.map(|p| p.id().to_string()),
            metadata: self.metadata,
        }
    }
}

/// Stripe Price object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,
    pub product: Option<Expandable<StripeRef>>,
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub currency: String,
    pub recurring: Option<StripeRecurring>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeRecurring {
    pub interval: String,
}

impl StripePrice {
    pub fn into_domain(self) -> Price {
        Price {
            id: self.id,
            product_id: self.product.map(|p| p.id().to_string()).unwrap_or_default(),
            unit_amount: self.unit_amount,
            currency: self.currency,
            recurring_interval: self.recurring.map(|r| r.interval),
            active: self.active,
        }
    }
}

/// Stripe Product object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeProduct {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeProduct {
    pub fn into_domain(self) -> Product {
        Product {
            id: self.id,
            name: self.name,
            active: self.active,
            metadata: self.metadata,
        }
    }
}

/// Stripe Coupon object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCoupon {
    pub id: String,
    pub name: Option<String>,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub duration: String,
    pub duration_in_months: Option<u32>,
    pub max_redemptions: Option<u32>,
    #[serde(default)]
    pub times_redeemed: u32,
    pub redeem_by: Option<i64>,
    #[serde(default = "default_true")]
    pub valid: bool,
}

impl StripeCoupon {
    pub fn into_domain(self) -> Coupon {
        Coupon {
            id: self.id,
            name: self.name,
            percent_off: self.percent_off,
            amount_off: self.amount_off,
            currency: self.currency,
            duration: self.duration,
            duration_in_months: self.duration_in_months,
            max_redemptions: self.max_redemptions,
            times_redeemed: self.times_redeemed,
            redeem_by: Timestamp::from_unix(self.redeem_by),
            valid: self.valid,
        }
    }
}

/// Stripe Promotion Code object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePromotionCode {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub active: bool,
    pub coupon: StripeCoupon,
    pub expires_at: Option<i64>,
    pub max_redemptions: Option<u32>,
    #[serde(default)]
    pub times_redeemed: u32,
}

impl StripePromotionCode {
    pub fn into_domain(self) -> PromotionCode {
        PromotionCode {
            id: self.id,
            code: self.code,
            active: self.active,
            coupon: self.coupon.into_domain(),
            expires_at: Timestamp::from_unix(self.expires_at),
            max_redemptions: self.max_redemptions,
            times_redeemed: self.times_redeemed,
        }
    }
}

/// Ephemeral key for the mobile payment sheet.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEphemeralKey {
    pub id: String,
    pub secret: String,
}

fn default_true() -> bool {
    true
}
