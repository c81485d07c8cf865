//! Billing handlers.
//!
//! Command and query handlers for the subscription lifecycle:
//!
//! ## Commands
//! - Creating or linking Stripe customers
//! - Starting hosted checkout and in-app payment sheets
//! - Confirming payment sheets into subscriptions
//! - Cancelling and reactivating subscriptions
//! - Syncing plans, coupons, promotion codes and discounted prices
//! - Processing Stripe webhooks
//!
//! ## Queries
//! - Verifying checkout sessions
//! - Billing history
//! - Coupon validation

mod billing_history;
mod checkout_metadata;
mod confirm_payment_sheet;
mod coupons;
mod create_checkout;
mod create_customer;
mod create_payment_sheet;
mod customer_resolver;
mod handle_stripe_webhook;
mod manage_subscription;
mod subscription_guard;
mod sync_plan;
mod verify_session;

// Shared collaborators
pub use customer_resolver::{CustomerDetails, CustomerResolver, ResolvedCustomer};
pub use subscription_guard::SubscriptionGuard;

// Commands
pub use confirm_payment_sheet::{
    ConfirmPaymentSheetCommand, ConfirmPaymentSheetHandler, ConfirmPaymentSheetResult,
};
pub use coupons::{
    CreateCouponCommand, CreateCouponHandler, CreateDiscountedPriceCommand,
    CreateDiscountedPriceHandler, CreateDiscountedPriceResult, CreatePromotionCodeCommand,
    CreatePromotionCodeHandler, DiscountedPlan,
};
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use create_customer::{CreateCustomerCommand, CreateCustomerHandler};
pub use create_payment_sheet::{
    CreatePaymentSheetCommand, CreatePaymentSheetHandler, CreatePaymentSheetResult,
};
pub use handle_stripe_webhook::{
    HandleStripeWebhookCommand, HandleStripeWebhookHandler, WebhookOutcome,
};
pub use manage_subscription::{
    CancelSubscriptionHandler, ManageSubscriptionCommand, ManageSubscriptionResult,
    ReactivateSubscriptionHandler,
};
pub use sync_plan::{SyncPlanCommand, SyncPlanHandler, SyncPlanResult};

// Queries
pub use billing_history::{
    BillingHistoryItem, GetBillingHistoryHandler, GetBillingHistoryQuery, DEFAULT_HISTORY_LIMIT,
    MAX_HISTORY_LIMIT,
};
pub use coupons::{CouponValidation, ValidateCouponHandler, ValidateCouponQuery};
pub use verify_session::{VerifySessionHandler, VerifySessionQuery, VerifySessionResult};
