//! Coupons, promotion codes and discounted prices.
//!
//! Stripe stores the coupon; these types carry the rules for creating one,
//! deciding whether a code can still be redeemed, and pricing a discount.

use serde::{Deserialize, Serialize};

use super::errors::BillingError;
use super::plan::{from_minor_units, normalize_currency, to_minor_units};
use crate::domain::foundation::Timestamp;

/// How a discount is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percent off, `0 < v <= 100`.
    Percentage,
    /// Fixed amount off, in major units of the coupon currency.
    Fixed,
}

impl DiscountType {
    pub fn parse(value: &str) -> Result<Self, BillingError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" | "percent_off" => Ok(DiscountType::Percentage),
            "fixed" | "amount" | "fixed_amount" | "amount_off" => Ok(DiscountType::Fixed),
            other => Err(BillingError::validation(
                "discountType",
                format!("Unsupported discount type: {}", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

/// How long a coupon keeps applying to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponDuration {
    Once,
    Repeating,
    Forever,
}

impl CouponDuration {
    pub fn parse(value: Option<&str>) -> Result<Self, BillingError> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("once") => Ok(CouponDuration::Once),
            Some("repeating") => Ok(CouponDuration::Repeating),
            Some("forever") => Ok(CouponDuration::Forever),
            Some(other) => Err(BillingError::validation(
                "duration",
                format!("Unsupported duration: {}", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CouponDuration::Once => "once",
            CouponDuration::Repeating => "repeating",
            CouponDuration::Forever => "forever",
        }
    }
}

/// Validated request to create a coupon.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoupon {
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub duration: CouponDuration,
    pub duration_in_months: Option<u32>,
    pub redeem_by: Option<Timestamp>,
    pub max_redemptions: Option<u32>,
    pub currency: String,
    /// Local promotion row this coupon backs, recorded as metadata.
    pub promotion_id: Option<String>,
}

impl NewCoupon {
    /// Applies the creation rules and normalizes the currency.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        discount_type: DiscountType,
        discount_value: f64,
        duration: CouponDuration,
        duration_in_months: Option<u32>,
        redeem_by: Option<Timestamp>,
        max_redemptions: Option<u32>,
        currency: Option<&str>,
        promotion_id: Option<String>,
        now: Timestamp,
    ) -> Result<Self, BillingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BillingError::missing("name"));
        }
        validate_discount(discount_type, discount_value)?;

        let duration_in_months = match duration {
            CouponDuration::Repeating => match duration_in_months {
                Some(months) if months >= 1 => Some(months),
                _ => {
                    return Err(BillingError::validation(
                        "durationInMonths",
                        "durationInMonths is required for repeating coupons",
                    ))
                }
            },
            _ => None,
        };

        if let Some(redeem_by) = redeem_by {
            if !redeem_by.is_after(&now) {
                return Err(BillingError::validation(
                    "endDate",
                    "endDate must be in the future",
                ));
            }
        }

        if max_redemptions == Some(0) {
            return Err(BillingError::validation(
                "maxRedemptions",
                "maxRedemptions must be at least 1",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            discount_type,
            discount_value,
            duration,
            duration_in_months,
            redeem_by,
            max_redemptions,
            currency: normalize_currency(currency),
            promotion_id,
        })
    }

    /// `amount_off` in minor units for fixed coupons.
    pub fn amount_off_minor(&self) -> Result<Option<i64>, BillingError> {
        match self.discount_type {
            DiscountType::Fixed => Ok(Some(to_minor_units(self.discount_value, &self.currency)?)),
            DiscountType::Percentage => Ok(None),
        }
    }
}

/// Coupon as Stripe reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub name: Option<String>,
    pub percent_off: Option<f64>,
    /// Minor units.
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    pub duration: String,
    pub duration_in_months: Option<u32>,
    pub max_redemptions: Option<u32>,
    pub times_redeemed: u32,
    pub redeem_by: Option<Timestamp>,
    pub valid: bool,
}

impl Coupon {
    /// Returns why the coupon cannot be redeemed, or `None` if it can.
    pub fn invalid_reason(&self, now: Timestamp) -> Option<&'static str> {
        if !self.valid {
            return Some("Coupon is no longer valid");
        }
        if self.redeem_by.map_or(false, |t| !t.is_after(&now)) {
            return Some("Coupon has expired");
        }
        if self
            .max_redemptions
            .map_or(false, |max| self.times_redeemed >= max)
        {
            return Some("Coupon has reached its maximum redemptions");
        }
        None
    }

    pub fn discount_type(&self) -> DiscountType {
        if self.percent_off.is_some() {
            DiscountType::Percentage
        } else {
            DiscountType::Fixed
        }
    }

    /// Discount value in the units a client expects: percent, or major units.
    pub fn discount_value(&self) -> f64 {
        match (self.percent_off, self.amount_off) {
            (Some(percent), _) => percent,
            (None, Some(amount)) => {
                from_minor_units(amount, &normalize_currency(self.currency.as_deref()))
            }
            (None, None) => 0.0,
        }
    }
}

/// Customer-facing promotion code wrapping a coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionCode {
    pub id: String,
    pub code: String,
    pub active: bool,
    pub coupon: Coupon,
    pub expires_at: Option<Timestamp>,
    pub max_redemptions: Option<u32>,
    pub times_redeemed: u32,
}

impl PromotionCode {
    /// Returns why the code cannot be redeemed, or `None` if it can.
    pub fn invalid_reason(&self, now: Timestamp) -> Option<&'static str> {
        if !self.active {
            return Some("Promotion code is inactive");
        }
        if self.expires_at.map_or(false, |t| !t.is_after(&now)) {
            return Some("Promotion code has expired");
        }
        if self
            .max_redemptions
            .map_or(false, |max| self.times_redeemed >= max)
        {
            return Some("Promotion code has reached its maximum redemptions");
        }
        self.coupon.invalid_reason(now)
    }
}

/// Validates a discount value for its type.
pub fn validate_discount(discount_type: DiscountType, value: f64) -> Result<(), BillingError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(BillingError::validation(
            "discountValue",
            "discountValue must be a positive number",
        ));
    }
    if discount_type == DiscountType::Percentage && value > 100.0 {
        return Err(BillingError::validation(
            "discountValue",
            "Percentage discount cannot exceed 100",
        ));
    }
    Ok(())
}

/// Applies a discount, clamps at zero and rounds to the currency's minor unit.
pub fn discounted_price(
    price: f64,
    discount_type: DiscountType,
    value: f64,
    currency: &str,
) -> Result<f64, BillingError> {
    validate_discount(discount_type, value)?;
    let raw = match discount_type {
        DiscountType::Percentage => price * (1.0 - value / 100.0),
        DiscountType::Fixed => price - value,
    };
    let minor = to_minor_units(raw.max(0.0), currency)?;
    Ok(from_minor_units(minor, currency))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_unix(Some(1_710_000_000)).unwrap()
    }

    fn coupon() -> Coupon {
        Coupon {
            id: "SPRING".to_string(),
            name: Some("Spring".to_string()),
            percent_off: Some(20.0),
            amount_off: None,
            currency: None,
            duration: "once".to_string(),
            duration_in_months: None,
            max_redemptions: Some(10),
            times_redeemed: 3,
            redeem_by: Some(now().add_days(7)),
            valid: true,
        }
    }

    fn promo() -> PromotionCode {
        PromotionCode {
            id: "promo_1".to_string(),
            code: "SPRING20".to_string(),
            active: true,
            coupon: coupon(),
            expires_at: Some(now().add_days(3)),
            max_redemptions: Some(5),
            times_redeemed: 0,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Redemption rules
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn valid_coupon_has_no_reason() {
        assert_eq!(coupon().invalid_reason(now()), None);
    }

    #[test]
    fn coupon_past_redeem_by_is_invalid() {
        let mut c = coupon();
        c.redeem_by = Some(now().plus_secs(-1));
        assert_eq!(c.invalid_reason(now()), Some("Coupon has expired"));
    }

    #[test]
    fn coupon_marked_invalid_by_stripe() {
        let mut c = coupon();
        c.valid = false;
        assert!(c.invalid_reason(now()).is_some());
    }

    #[test]
    fn promotion_code_rules() {
        assert_eq!(promo().invalid_reason(now()), None);

        let mut inactive = promo();
        inactive.active = false;
        assert_eq!(inactive.invalid_reason(now()), Some("Promotion code is inactive"));

        let mut expired = promo();
        expired.expires_at = Some(now().plus_secs(-60));
        assert_eq!(expired.invalid_reason(now()), Some("Promotion code has expired"));

        let mut used_up = promo();
        used_up.times_redeemed = 5;
        assert!(used_up.invalid_reason(now()).is_some());

        let mut bad_coupon = promo();
        bad_coupon.coupon.valid = false;
        assert_eq!(bad_coupon.invalid_reason(now()), Some("Coupon is no longer valid"));
    }

    #[test]
    fn fixed_coupon_reports_major_units() {
        let mut c = coupon();
        c.percent_off = None;
        c.amount_off = Some(500);
        c.currency = Some("usd".to_string());
        assert_eq!(c.discount_type(), DiscountType::Fixed);
        assert_eq!(c.discount_value(), 5.0);

        c.amount_off = Some(1000);
        c.currency = Some("krw".to_string());
        assert_eq!(c.discount_value(), 1000.0);
    }

    // ══════════════════════════════════════════════════════════════
    // Creation rules
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn repeating_coupon_requires_months() {
        let err = NewCoupon::new(
            "Spring",
            DiscountType::Percentage,
            20.0,
            CouponDuration::Repeating,
            None,
            None,
            None,
            None,
            None,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "durationInMonths"));
    }

    #[test]
    fn percentage_over_hundred_is_rejected() {
        assert!(validate_discount(DiscountType::Percentage, 120.0).is_err());
        assert!(validate_discount(DiscountType::Percentage, 100.0).is_ok());
        assert!(validate_discount(DiscountType::Fixed, 120.0).is_ok());
        assert!(validate_discount(DiscountType::Fixed, 0.0).is_err());
    }

    #[test]
    fn end_date_must_be_in_future() {
        let result = NewCoupon::new(
            "Spring",
            DiscountType::Fixed,
            5.0,
            CouponDuration::Once,
            None,
            Some(now().plus_secs(-10)),
            None,
            Some("usd"),
            None,
            now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn fixed_coupon_amount_in_minor_units() {
        let c = NewCoupon::new(
            "Launch",
            DiscountType::Fixed,
            4.5,
            CouponDuration::Forever,
            Some(3),
            None,
            Some(100),
            Some("USD"),
            Some("promo-row-1".to_string()),
            now(),
        )
        .unwrap();
        assert_eq!(c.currency, "usd");
        assert_eq!(c.amount_off_minor().unwrap(), Some(450));
        assert_eq!(c.duration_in_months, None);
    }

    #[test]
    fn discount_type_parsing() {
        assert_eq!(DiscountType::parse("percent").unwrap(), DiscountType::Percentage);
        assert_eq!(DiscountType::parse("amount").unwrap(), DiscountType::Fixed);
        assert!(DiscountType::parse("bogo").is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Discounted price
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn percentage_discount_rounds_to_cents() {
        assert_eq!(discounted_price(9.99, DiscountType::Percentage, 20.0, "usd").unwrap(), 7.99);
    }

    #[test]
    fn fixed_discount_clamps_at_zero() {
        assert_eq!(discounted_price(3.0, DiscountType::Fixed, 5.0, "usd").unwrap(), 0.0);
    }

    #[test]
    fn zero_decimal_discount_rounds_to_whole_units() {
        assert_eq!(discounted_price(4900.0, DiscountType::Percentage, 33.0, "krw").unwrap(), 3283.0);
    }
}
