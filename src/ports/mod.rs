//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `PaymentProvider` - Stripe: customers, intents, subscriptions, catalog, events
//! - `ProfileStore` - `user_profiles` rows and their `premium` record
//! - `PlanStore` - `premium_plans` rows
//! - `IdentityDirectory` - email to user id lookups in the identity provider

mod identity_directory;
mod payment_provider;
mod plan_store;
mod profile_store;

pub use identity_directory::IdentityDirectory;
pub use payment_provider::{
    CheckoutDiscount, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest,
    CreatePriceRequest, CreateProductRequest, CreatePromotionCodeRequest,
    CreateSetupIntentRequest, CreateSubscriptionRequest, Customer, EventQuery, Intent, IntentKind,
    Invoice, PaymentError, PaymentErrorCode, PaymentProvider, Price, Product, SubscriptionQuery,
    SubscriptionUpdate, WebhookEvent, WebhookEventData, WebhookEventType,
};
pub use plan_store::PlanStore;
pub use profile_store::{ProfileStore, StoreError, StoreErrorCode};
