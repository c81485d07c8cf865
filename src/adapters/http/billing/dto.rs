//! HTTP DTOs for the Stripe billing endpoints.
//!
//! Requests default every field so a missing value reaches the handler's own
//! validation and answers `Missing required field: X` rather than a parse
//! error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    BillingHistoryItem, CouponValidation, CreateCheckoutResult, CreateDiscountedPriceResult,
    CreatePaymentSheetResult, ResolvedCustomer, SyncPlanResult,
};
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{Coupon, PromotionCode, Subscription, SubscriptionStatus};
use crate::ports::CheckoutSession;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub user_id: String,
    pub email: String,
    pub plan_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub coupon_id: Option<String>,
    pub promotion_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatePaymentSheetRequest {
    pub user_id: String,
    pub email: String,
    pub plan_id: String,
    pub stripe_price_id: String,
    pub product_id: Option<String>,
    pub platform: Option<String>,
    pub coupon_id: Option<String>,
    pub promotion_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfirmPaymentSheetRequest {
    pub payment_intent_id: String,
    pub plan_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerifySessionParams {
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManageSubscriptionRequest {
    pub user_id: String,
    pub subscription_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BillingHistoryRequest {
    pub user_id: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncPlanRequest {
    pub plan_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCouponRequest {
    pub name: String,
    pub discount_type: String,
    pub discount_value: f64,
    pub duration: Option<String>,
    pub duration_in_months: Option<u32>,
    pub end_date: Option<String>,
    pub max_redemptions: Option<u32>,
    pub currency: Option<String>,
    pub promotion_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatePromotionCodeRequest {
    pub coupon_id: String,
    pub code: String,
    pub active: Option<bool>,
    pub max_redemptions: Option<u32>,
    pub expires_at: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscountedPlanRequest {
    pub id: String,
    pub price: f64,
    pub interval: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateDiscountedPriceRequest {
    pub product_id: String,
    pub plan: DiscountedPlanRequest,
    pub discount_value: f64,
    pub discount_type: String,
}

/// Accepted as a query string (GET) or a JSON body (POST).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidateCouponRequest {
    pub code: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub customer_id: String,
    pub is_existing: bool,
}

impl From<ResolvedCustomer> for CustomerResponse {
    fn from(customer: ResolvedCustomer) -> Self {
        Self {
            customer_id: customer.customer_id,
            is_existing: customer.is_existing,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: Option<String>,
    pub session_id: String,
    pub customer_id: String,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        Self {
            url: result.url,
            session_id: result.session_id,
            customer_id: result.customer_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSheetResponse {
    /// SetupIntent client secret.
    pub setup_intent: String,
    pub setup_intent_id: String,
    pub ephemeral_key: String,
    pub customer: String,
    pub publishable_key: Option<String>,
    pub plan_id: String,
    pub stripe_price_id: String,
}

impl From<CreatePaymentSheetResult> for PaymentSheetResponse {
    fn from(result: CreatePaymentSheetResult) -> Self {
        Self {
            setup_intent: result.setup_intent,
            setup_intent_id: result.setup_intent_id,
            ephemeral_key: result.ephemeral_key,
            customer: result.customer,
            publishable_key: result.publishable_key,
            plan_id: result.plan_id,
            stripe_price_id: result.stripe_price_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentSheetResponse {
    pub success: bool,
    pub subscription_id: String,
}

/// Checkout session, in Stripe's own field spelling.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub mode: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub subscription: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl From<CheckoutSession> for SessionView {
    fn from(session: CheckoutSession) -> Self {
        Self {
            id: session.id,
            mode: session.mode,
            status: session.status,
            payment_status: session.payment_status,
            customer: session.customer_id,
            customer_email: session.customer_email,
            subscription: session
                .subscription_id
                .or_else(|| session.subscription.map(|s| s.id)),
            amount_total: session.amount_total,
            currency: session.currency,
            metadata: session.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifySessionResponse {
    pub success: bool,
    pub session: SessionView,
}

/// Subscription after cancel or reactivate, in Stripe's field spelling with
/// epoch-second instants.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<i64>,
}

impl SubscriptionView {
    pub fn canceled(sub: &Subscription) -> Self {
        Self {
            id: sub.id.clone(),
            status: sub.status,
            cancel_at_period_end: sub.cancel_at_period_end,
            current_period_end: sub.current_period_end.map(|t| t.as_unix()),
            canceled_at: sub.canceled_at.map(|t| t.as_unix()),
        }
    }

    pub fn reactivated(sub: &Subscription) -> Self {
        Self {
            canceled_at: None,
            ..Self::canceled(sub)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManageSubscriptionResponse {
    pub success: bool,
    pub subscription: SubscriptionView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingHistoryEntry {
    pub id: String,
    pub number: Option<String>,
    pub amount_paid: f64,
    pub currency: String,
    pub status: Option<String>,
    pub created: Option<Timestamp>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
}

impl From<BillingHistoryItem> for BillingHistoryEntry {
    fn from(item: BillingHistoryItem) -> Self {
        Self {
            id: item.id,
            number: item.number,
            amount_paid: item.amount_paid,
            currency: item.currency,
            status: item.status,
            created: item.created,
            period_start: item.period_start,
            period_end: item.period_end,
            hosted_invoice_url: item.hosted_invoice_url,
            invoice_pdf: item.invoice_pdf,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingHistoryResponse {
    pub success: bool,
    pub billing_history: Vec<BillingHistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    pub id: String,
    pub name: String,
    pub stripe_product_id: String,
    pub stripe_price_id: String,
}

impl From<SyncPlanResult> for PlanView {
    fn from(result: SyncPlanResult) -> Self {
        Self {
            id: result.id,
            name: result.name,
            stripe_product_id: result.stripe_product_id,
            stripe_price_id: result.stripe_price_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPlanResponse {
    pub success: bool,
    pub plan: PlanView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponResponse {
    pub coupon_id: String,
    pub coupon: Coupon,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCodeResponse {
    pub promotion_code_id: String,
    pub promotion_code: PromotionCode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountedPriceResponse {
    pub price_id: String,
    pub original_price: f64,
    pub discounted_price: f64,
    pub discount_value: f64,
    pub discount_type: &'static str,
}

impl From<CreateDiscountedPriceResult> for DiscountedPriceResponse {
    fn from(result: CreateDiscountedPriceResult) -> Self {
        Self {
            price_id: result.price_id,
            original_price: result.original_price,
            discounted_price: result.discounted_price,
            discount_value: result.discount_value,
            discount_type: result.discount_type.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<PromotionCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CouponValidation> for ValidateCouponResponse {
    fn from(validation: CouponValidation) -> Self {
        Self {
            valid: validation.valid,
            discount_type: validation.discount_type().map(|t| t.as_str()),
            discount_value: validation.discount_value(),
            coupon: validation.coupon,
            promotion_code: validation.promotion_code,
            error: validation.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stripe::active_subscription;

    #[test]
    fn missing_request_fields_default_to_empty() {
        let request: CreateCheckoutRequest =
            serde_json::from_str(r#"{"userId":"U1"}"#).unwrap();
        assert_eq!(request.user_id, "U1");
        assert!(request.email.is_empty());
        assert!(request.coupon_id.is_none());
    }

    #[test]
    fn reactivated_view_omits_canceled_at() {
        let now = Timestamp::now();
        let mut sub = active_subscription("cus_1", "sub_a", now);
        sub.canceled_at = Some(now);

        let canceled = serde_json::to_value(SubscriptionView::canceled(&sub)).unwrap();
        let reactivated = serde_json::to_value(SubscriptionView::reactivated(&sub)).unwrap();

        assert_eq!(canceled["canceled_at"], now.as_unix());
        assert!(reactivated.get("canceled_at").is_none());
        assert_eq!(
            reactivated["current_period_end"],
            sub.current_period_end.unwrap().as_unix()
        );
    }

    #[test]
    fn invalid_coupon_response_is_sparse() {
        let response = ValidateCouponResponse::from(CouponValidation {
            valid: false,
            coupon: None,
            promotion_code: None,
            error: Some("Invalid coupon code".to_string()),
        });
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "error": "Invalid coupon code"}));
    }
}
