//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for Stripe, including:
//! - Customers, intents and checkout sessions
//! - Subscription lifecycle
//! - Catalog, coupons and promotion codes
//! - Invoices and event enumeration
//! - Webhook signature verification
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod mock_payment_provider;
mod stripe_adapter;
mod webhook_types;

pub use mock_payment_provider::{active_subscription, MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter, DEFAULT_API_BASE};
pub use webhook_types::{
    StripeCheckoutSession, StripeCustomer, StripeInvoice, StripeSubscription, StripeWebhookEvent,
};
