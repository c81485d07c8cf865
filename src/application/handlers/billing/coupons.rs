//! Coupon, promotion code and discounted price handlers.

use std::collections::HashMap;
use std::sync::Arc;

use super::checkout_metadata::require;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{
    discounted_price, idempotency_key, normalize_currency, to_minor_units, BillingError, Coupon,
    CouponDuration, DiscountType, NewCoupon, PlanInterval, PromotionCode, METADATA_PLAN_ID,
};
use crate::ports::{CreatePriceRequest, CreatePromotionCodeRequest, PaymentProvider};

const MAX_CODE_LEN: usize = 64;

// ════════════════════════════════════════════════════════════════════════════════
// Create coupon
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct CreateCouponCommand {
    pub name: String,
    pub discount_type: String,
    pub discount_value: f64,
    pub duration: Option<String>,
    pub duration_in_months: Option<u32>,
    /// RFC 3339 instant after which the coupon can no longer be redeemed.
    pub end_date: Option<String>,
    pub max_redemptions: Option<u32>,
    pub currency: Option<String>,
    pub promotion_id: Option<String>,
}

pub struct CreateCouponHandler {
    payments: Arc<dyn PaymentProvider>,
}

impl CreateCouponHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>) -> Self {
        Self { payments }
    }

    pub async fn handle(&self, cmd: CreateCouponCommand) -> Result<Coupon, BillingError> {
        let redeem_by = parse_instant("endDate", cmd.end_date.as_deref())?;
        let coupon = NewCoupon::new(
            &cmd.name,
            DiscountType::parse(&cmd.discount_type)?,
            cmd.discount_value,
            CouponDuration::parse(cmd.duration.as_deref())?,
            cmd.duration_in_months,
            redeem_by,
            cmd.max_redemptions,
            cmd.currency.as_deref(),
            cmd.promotion_id.clone(),
            Timestamp::now(),
        )?;

        let created = self.payments.create_coupon(&coupon).await?;
        tracing::info!(coupon_id = %created.id, name = %coupon.name, "Coupon created");
        Ok(created)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Create promotion code
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct CreatePromotionCodeCommand {
    pub coupon_id: String,
    pub code: String,
    pub active: Option<bool>,
    pub max_redemptions: Option<u32>,
    pub expires_at: Option<String>,
    pub metadata: HashMap<String, String>,
}

pub struct CreatePromotionCodeHandler {
    payments: Arc<dyn PaymentProvider>,
}

impl CreatePromotionCodeHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>) -> Self {
        Self { payments }
    }

    pub async fn handle(
        &self,
        cmd: CreatePromotionCodeCommand,
    ) -> Result<PromotionCode, BillingError> {
        let coupon_id = require("couponId", &cmd.coupon_id)?;
        let code = normalize_code(&cmd.code)?;
        let expires_at = parse_instant("expiresAt", cmd.expires_at.as_deref())?;
        if let Some(expires_at) = expires_at {
            if !expires_at.is_after(&Timestamp::now()) {
                return Err(BillingError::validation(
                    "expiresAt",
                    "expiresAt must be in the future",
                ));
            }
        }
        if cmd.max_redemptions == Some(0) {
            return Err(BillingError::validation(
                "maxRedemptions",
                "maxRedemptions must be at least 1",
            ));
        }

        if self.payments.get_coupon(coupon_id).await?.is_none() {
            return Err(BillingError::validation("couponId", "Coupon not found"));
        }

        let created = self
            .payments
            .create_promotion_code(CreatePromotionCodeRequest {
                coupon_id: coupon_id.to_string(),
                code: code.clone(),
                active: cmd.active.unwrap_or(true),
                max_redemptions: cmd.max_redemptions,
                expires_at,
                metadata: cmd.metadata,
            })
            .await
            .map_err(|e| match BillingError::from(e) {
                BillingError::DuplicateCode(_) => {
                    BillingError::DuplicateCode(format!("Promotion code {} already exists", code))
                }
                other => other,
            })?;

        tracing::info!(
            promotion_code_id = %created.id,
            coupon_id = %coupon_id,
            "Promotion code created"
        );
        Ok(created)
    }
}

/// Codes are case-insensitive at Stripe; store them upper-cased.
fn normalize_code(code: &str) -> Result<String, BillingError> {
    let code = require("code", code)?;
    if code.len() > MAX_CODE_LEN
        || !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BillingError::validation(
            "code",
            "Code may contain only letters, digits, '-' and '_'",
        ));
    }
    Ok(code.to_ascii_uppercase())
}

// ════════════════════════════════════════════════════════════════════════════════
// Create discounted price
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct DiscountedPlan {
    pub id: String,
    pub price: f64,
    pub interval: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateDiscountedPriceCommand {
    pub product_id: String,
    pub plan: DiscountedPlan,
    pub discount_value: f64,
    pub discount_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateDiscountedPriceResult {
    pub price_id: String,
    pub original_price: f64,
    pub discounted_price: f64,
    pub discount_value: f64,
    pub discount_type: DiscountType,
}

pub struct CreateDiscountedPriceHandler {
    payments: Arc<dyn PaymentProvider>,
}

impl CreateDiscountedPriceHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>) -> Self {
        Self { payments }
    }

    pub async fn handle(
        &self,
        cmd: CreateDiscountedPriceCommand,
    ) -> Result<CreateDiscountedPriceResult, BillingError> {
        let product_id = require("productId", &cmd.product_id)?;
        let plan_id = require("plan.id", &cmd.plan.id)?;
        let discount_type = DiscountType::parse(&cmd.discount_type)?;
        let currency = normalize_currency(cmd.plan.currency.as_deref());
        let interval = PlanInterval::parse(cmd.plan.interval.as_deref());

        let discounted = discounted_price(cmd.plan.price, discount_type, cmd.discount_value, &currency)?;
        let amount = to_minor_units(discounted, &currency)?;
        let kind = format!(
            "discounted-price:{}:{}",
            discount_type.as_str(),
            cmd.discount_value
        );

        let price = self
            .payments
            .create_price(CreatePriceRequest {
                product_id: product_id.to_string(),
                unit_amount: amount,
                currency: currency.clone(),
                recurring_interval: interval.stripe_interval().map(str::to_string),
                nickname: Some(format!("{} ({} {} off)", plan_id, cmd.discount_value, discount_type.as_str())),
                metadata: HashMap::from([
                    (METADATA_PLAN_ID.to_string(), plan_id.to_string()),
                    ("discountType".to_string(), discount_type.as_str().to_string()),
                    ("discountValue".to_string(), cmd.discount_value.to_string()),
                    ("originalPrice".to_string(), cmd.plan.price.to_string()),
                ]),
                idempotency_key: Some(idempotency_key(&kind, plan_id, amount, &currency, interval)),
            })
            .await?;

        tracing::info!(
            plan_id = %plan_id,
            price_id = %price.id,
            amount_minor = amount,
            "Discounted price created"
        );

        Ok(CreateDiscountedPriceResult {
            price_id: price.id,
            original_price: cmd.plan.price,
            discounted_price: discounted,
            discount_value: cmd.discount_value,
            discount_type,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Validate coupon
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ValidateCouponQuery {
    pub code: String,
}

/// Outcome of a coupon lookup. Invalid codes are an answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponValidation {
    pub valid: bool,
    pub coupon: Option<Coupon>,
    pub promotion_code: Option<PromotionCode>,
    pub error: Option<String>,
}

impl CouponValidation {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            coupon: None,
            promotion_code: None,
            error: Some(error.into()),
        }
    }

    pub fn discount_type(&self) -> Option<DiscountType> {
        self.coupon.as_ref().map(Coupon::discount_type)
    }

    pub fn discount_value(&self) -> Option<f64> {
        self.coupon.as_ref().map(Coupon::discount_value)
    }
}

pub struct ValidateCouponHandler {
    payments: Arc<dyn PaymentProvider>,
}

impl ValidateCouponHandler {
    pub fn new(payments: Arc<dyn PaymentProvider>) -> Self {
        Self { payments }
    }

    pub async fn handle(&self, query: ValidateCouponQuery) -> Result<CouponValidation, BillingError> {
        let code = require("code", &query.code)?;
        let now = Timestamp::now();

        if let Some(promo) = self.payments.find_promotion_code(code).await? {
            let reason = promo.invalid_reason(now);
            return Ok(CouponValidation {
                valid: reason.is_none(),
                coupon: Some(promo.coupon.clone()),
                promotion_code: Some(promo),
                error: reason.map(str::to_string),
            });
        }

        match self.payments.get_coupon(code).await? {
            Some(coupon) => {
                let reason = coupon.invalid_reason(now);
                Ok(CouponValidation {
                    valid: reason.is_none(),
                    coupon: Some(coupon),
                    promotion_code: None,
                    error: reason.map(str::to_string),
                })
            }
            None => Ok(CouponValidation::invalid("Invalid coupon code")),
        }
    }
}

fn parse_instant(field: &str, value: Option<&str>) -> Result<Option<Timestamp>, BillingError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => Timestamp::parse_rfc3339(raw)
            .map(Some)
            .ok_or_else(|| BillingError::validation(field, format!("{} must be an ISO 8601 instant", field))),
    }
}
