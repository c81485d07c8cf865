//! Axum router configuration for the Stripe billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    billing_history, cancel_subscription, confirm_payment_sheet, create_checkout, create_coupon,
    create_customer, create_discounted_price, create_payment_sheet, create_promotion_code,
    reactivate_subscription, stripe_webhook, sync_plan, validate_coupon_body,
    validate_coupon_query, verify_session,
};
use crate::adapters::http::router::only;
use crate::adapters::http::state::AppState;

/// Create the billing API router, mounted at `/api/stripe`.
///
/// # Routes
///
/// ## Webhook (signature verified, no other auth)
/// - `POST /webhook`
///
/// ## Synchronous flows
/// - `POST /create-customer`
/// - `POST /create-checkout`
/// - `POST /create-paymentsheet`
/// - `POST /confirm-paymentsheet`
/// - `GET /verify-session`
/// - `POST /cancel-subscription`
/// - `POST /reactivate-subscription`
/// - `POST /get-billing-history`
///
/// ## Catalog
/// - `POST /sync-plan`
/// - `POST /create-coupon`
/// - `POST /create-promotion-code`
/// - `POST /create-discounted-price`
/// - `GET|POST /validate-coupon`
pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(stripe_webhook).fallback(only("POST")))
        // Synchronous flows
        .route("/create-customer", post(create_customer).fallback(only("POST")))
        .route("/create-checkout", post(create_checkout).fallback(only("POST")))
        .route(
            "/create-paymentsheet",
            post(create_payment_sheet).fallback(only("POST")),
        )
        .route(
            "/confirm-paymentsheet",
            post(confirm_payment_sheet).fallback(only("POST")),
        )
        .route("/verify-session", get(verify_session).fallback(only("GET")))
        .route(
            "/cancel-subscription",
            post(cancel_subscription).fallback(only("POST")),
        )
        .route(
            "/reactivate-subscription",
            post(reactivate_subscription).fallback(only("POST")),
        )
        .route(
            "/get-billing-history",
            post(billing_history).fallback(only("POST")),
        )
        // Catalog
        .route("/sync-plan", post(sync_plan).fallback(only("POST")))
        .route("/create-coupon", post(create_coupon).fallback(only("POST")))
        .route(
            "/create-promotion-code",
            post(create_promotion_code).fallback(only("POST")),
        )
        .route(
            "/create-discounted-price",
            post(create_discounted_price).fallback(only("POST")),
        )
        .route(
            "/validate-coupon",
            get(validate_coupon_query)
                .post(validate_coupon_body)
                .fallback(only("GET, POST")),
        )
}
