//! HTTP handlers for the Stripe billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query
//! handlers. Every body is extracted fallibly so a malformed request maps
//! through `ApiError` like any other validation failure.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use crate::adapters::http::error::ApiError;
use crate::adapters::http::state::AppState;
use crate::application::handlers::billing::{
    ConfirmPaymentSheetCommand, CreateCheckoutCommand, CreateCouponCommand,
    CreateCustomerCommand, CreateDiscountedPriceCommand, CreatePaymentSheetCommand,
    CreatePromotionCodeCommand, DiscountedPlan, GetBillingHistoryQuery,
    HandleStripeWebhookCommand, ManageSubscriptionCommand, SyncPlanCommand, ValidateCouponQuery,
    VerifySessionQuery, WebhookOutcome,
};

use super::dto::{
    BillingHistoryRequest, BillingHistoryResponse, CheckoutResponse, ConfirmPaymentSheetRequest,
    ConfirmPaymentSheetResponse, CouponResponse, CreateCheckoutRequest, CreateCouponRequest,
    CreateCustomerRequest, CreateDiscountedPriceRequest, CreatePaymentSheetRequest,
    CreatePromotionCodeRequest, CustomerResponse, DiscountedPriceResponse,
    ManageSubscriptionRequest, ManageSubscriptionResponse, PaymentSheetResponse, PlanView,
    PromotionCodeResponse, SessionView, SubscriptionView, SyncPlanRequest, SyncPlanResponse,
    ValidateCouponRequest, ValidateCouponResponse, VerifySessionParams, VerifySessionResponse,
    WebhookAck,
};

const STRIPE_SIGNATURE: &str = "stripe-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/stripe/webhook
///
/// The raw body is verified against `Stripe-Signature` before any parsing.
/// Per-event failures are logged by the handler and still acknowledged, so
/// Payments does not retry an event the periodic sync will repair.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let services = state.services()?;
    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = services
        .webhook_handler()
        .handle(HandleStripeWebhookCommand {
            payload: body.to_vec(),
            signature,
        })
        .await?;

    if let WebhookOutcome::Failed(reason) = &outcome {
        tracing::debug!(reason = %reason, "Webhook acknowledged after processing failure");
    }

    Ok(Json(WebhookAck { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Customers and checkout
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/stripe/create-customer
pub async fn create_customer(
    State(state): State<AppState>,
    request: Result<Json<CreateCustomerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let customer = services
        .create_customer_handler()
        .handle(CreateCustomerCommand {
            user_id: request.user_id,
            email: request.email,
            name: request.name,
            phone: request.phone,
            metadata: request.metadata,
        })
        .await?;

    Ok(Json(CustomerResponse::from(customer)))
}

/// POST /api/stripe/create-checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    request: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .create_checkout_handler()
        .handle(CreateCheckoutCommand {
            user_id: request.user_id,
            email: request.email,
            plan_id: request.plan_id,
            price_id: request.price_id,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
            coupon_id: request.coupon_id,
            promotion_id: request.promotion_id,
        })
        .await?;

    Ok(Json(CheckoutResponse::from(result)))
}

/// POST /api/stripe/create-paymentsheet
pub async fn create_payment_sheet(
    State(state): State<AppState>,
    request: Result<Json<CreatePaymentSheetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .create_payment_sheet_handler()
        .handle(CreatePaymentSheetCommand {
            user_id: request.user_id,
            email: request.email,
            plan_id: request.plan_id,
            stripe_price_id: request.stripe_price_id,
            product_id: request.product_id,
            platform: request.platform,
            coupon_id: request.coupon_id,
            promotion_id: request.promotion_id,
        })
        .await?;

    Ok(Json(PaymentSheetResponse::from(result)))
}

/// POST /api/stripe/confirm-paymentsheet
pub async fn confirm_payment_sheet(
    State(state): State<AppState>,
    request: Result<Json<ConfirmPaymentSheetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .confirm_payment_sheet_handler()
        .handle(ConfirmPaymentSheetCommand {
            payment_intent_id: request.payment_intent_id,
            plan_id: request.plan_id,
            user_id: request.user_id,
        })
        .await?;

    Ok(Json(ConfirmPaymentSheetResponse {
        success: true,
        subscription_id: result.subscription_id,
    }))
}

/// GET /api/stripe/verify-session?session_id=...
pub async fn verify_session(
    State(state): State<AppState>,
    params: Result<Query<VerifySessionParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let services = state.services()?;

    let result = services
        .verify_session_handler()
        .handle(VerifySessionQuery {
            session_id: params.session_id,
        })
        .await?;

    Ok(Json(VerifySessionResponse {
        success: true,
        session: SessionView::from(result.session),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription management
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/stripe/cancel-subscription
pub async fn cancel_subscription(
    State(state): State<AppState>,
    request: Result<Json<ManageSubscriptionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .cancel_subscription_handler()
        .handle(ManageSubscriptionCommand {
            user_id: request.user_id,
            subscription_id: request.subscription_id,
        })
        .await?;

    Ok(Json(ManageSubscriptionResponse {
        success: true,
        subscription: SubscriptionView::canceled(&result.subscription),
    }))
}

/// POST /api/stripe/reactivate-subscription
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    request: Result<Json<ManageSubscriptionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .reactivate_subscription_handler()
        .handle(ManageSubscriptionCommand {
            user_id: request.user_id,
            subscription_id: request.subscription_id,
        })
        .await?;

    Ok(Json(ManageSubscriptionResponse {
        success: true,
        subscription: SubscriptionView::reactivated(&result.subscription),
    }))
}

/// POST /api/stripe/get-billing-history
pub async fn billing_history(
    State(state): State<AppState>,
    request: Result<Json<BillingHistoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let items = services
        .billing_history_handler()
        .handle(GetBillingHistoryQuery {
            user_id: request.user_id,
            limit: request.limit,
        })
        .await?;

    Ok(Json(BillingHistoryResponse {
        success: true,
        billing_history: items.into_iter().map(Into::into).collect(),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/stripe/sync-plan
pub async fn sync_plan(
    State(state): State<AppState>,
    request: Result<Json<SyncPlanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .sync_plan_handler()
        .handle(SyncPlanCommand {
            plan_id: request.plan_id,
        })
        .await?;

    Ok(Json(SyncPlanResponse {
        success: true,
        plan: PlanView::from(result),
    }))
}

/// POST /api/stripe/create-coupon
pub async fn create_coupon(
    State(state): State<AppState>,
    request: Result<Json<CreateCouponRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let coupon = services
        .create_coupon_handler()
        .handle(CreateCouponCommand {
            name: request.name,
            discount_type: request.discount_type,
            discount_value: request.discount_value,
            duration: request.duration,
            duration_in_months: request.duration_in_months,
            end_date: request.end_date,
            max_redemptions: request.max_redemptions,
            currency: request.currency,
            promotion_id: request.promotion_id,
        })
        .await?;

    Ok(Json(CouponResponse {
        coupon_id: coupon.id.clone(),
        coupon,
    }))
}

/// POST /api/stripe/create-promotion-code
pub async fn create_promotion_code(
    State(state): State<AppState>,
    request: Result<Json<CreatePromotionCodeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let promotion_code = services
        .create_promotion_code_handler()
        .handle(CreatePromotionCodeCommand {
            coupon_id: request.coupon_id,
            code: request.code,
            active: request.active,
            max_redemptions: request.max_redemptions,
            expires_at: request.expires_at,
            metadata: request.metadata,
        })
        .await?;

    Ok(Json(PromotionCodeResponse {
        promotion_code_id: promotion_code.id.clone(),
        promotion_code,
    }))
}

/// POST /api/stripe/create-discounted-price
pub async fn create_discounted_price(
    State(state): State<AppState>,
    request: Result<Json<CreateDiscountedPriceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let services = state.services()?;

    let result = services
        .create_discounted_price_handler()
        .handle(CreateDiscountedPriceCommand {
            product_id: request.product_id,
            plan: DiscountedPlan {
                id: request.plan.id,
                price: request.plan.price,
                interval: request.plan.interval,
                currency: request.plan.currency,
            },
            discount_value: request.discount_value,
            discount_type: request.discount_type,
        })
        .await?;

    Ok(Json(DiscountedPriceResponse::from(result)))
}

/// GET /api/stripe/validate-coupon?code=...
pub async fn validate_coupon_query(
    State(state): State<AppState>,
    params: Result<Query<ValidateCouponRequest>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    validate_coupon(&state, params).await
}

/// POST /api/stripe/validate-coupon
pub async fn validate_coupon_body(
    State(state): State<AppState>,
    request: Result<Json<ValidateCouponRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    validate_coupon(&state, request).await
}

async fn validate_coupon(
    state: &AppState,
    request: ValidateCouponRequest,
) -> Result<Json<ValidateCouponResponse>, ApiError> {
    let services = state.services()?;
    let validation = services
        .validate_coupon_handler()
        .handle(ValidateCouponQuery { code: request.code })
        .await?;
    Ok(Json(ValidateCouponResponse::from(validation)))
}
