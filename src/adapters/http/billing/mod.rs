//! HTTP adapter for the Stripe billing endpoints.
//!
//! Exposes the billing flows via REST API under `/api/stripe`:
//! - `POST /webhook` - Verified Stripe webhook intake
//! - `POST /create-customer` - Ensure a Stripe customer for a user
//! - `POST /create-checkout` - Hosted Checkout session
//! - `POST /create-paymentsheet` - SetupIntent for the mobile payment sheet
//! - `POST /confirm-paymentsheet` - Turn a confirmed intent into a subscription
//! - `GET /verify-session` - Confirm a Checkout session and catch up
//! - `POST /cancel-subscription` / `POST /reactivate-subscription`
//! - `POST /get-billing-history` - Recent invoices
//! - `POST /sync-plan` - Upsert a plan's product and price
//! - `POST /create-coupon`, `/create-promotion-code`, `/create-discounted-price`
//! - `GET|POST /validate-coupon`

pub mod dto;
pub mod handlers;
pub mod routes;

pub use routes::billing_routes;
