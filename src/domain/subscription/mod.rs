//! Subscription domain module.
//!
//! Pure types and rules for mirroring Stripe subscription state onto the
//! `premium` record of a user profile.
//!
//! # Module Structure
//!
//! - `status` - Stripe subscription status mirror
//! - `subscription` - Snapshot of a Stripe subscription
//! - `premium` - Stored premium record and profile row
//! - `projector` - Pure state projection
//! - `plan` - Premium plans, minor units, idempotency keys
//! - `coupon` - Coupon and promotion code rules
//! - `errors` - Billing error taxonomy
//! - `webhook_verifier` / `webhook_errors` - Stripe signature checks

mod coupon;
mod errors;
mod plan;
mod premium;
mod projector;
mod status;
pub(crate) mod subscription;
mod webhook_errors;
mod webhook_verifier;

pub use coupon::{
    discounted_price, validate_discount, Coupon, CouponDuration, DiscountType, NewCoupon,
    PromotionCode,
};
pub use errors::{BillingError, ConflictKind};
pub use plan::{
    from_minor_units, idempotency_key, is_zero_decimal, normalize_currency, to_minor_units, Plan,
    PlanInterval, DEFAULT_CURRENCY,
};
pub use premium::{PremiumRecord, StoredPremium, UserProfile};
pub use projector::{project, project_vanished, Projection, ProjectionDirective, ProjectionReason};
pub use status::SubscriptionStatus;
pub use subscription::{Subscription, METADATA_PLAN_ID, METADATA_USER_ID};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{signature_header, SignatureHeader, StripeWebhookVerifier};
