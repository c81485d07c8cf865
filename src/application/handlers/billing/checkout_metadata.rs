//! Metadata stamped on Stripe objects so webhooks can find the user again.

use std::collections::HashMap;

use crate::domain::foundation::UserId;
use crate::domain::subscription::{BillingError, METADATA_PLAN_ID, METADATA_USER_ID};

pub const METADATA_PRICE_ID: &str = "priceId";
pub const METADATA_COUPON_ID: &str = "couponId";
pub const METADATA_PROMOTION_ID: &str = "promotionId";

#[derive(Debug, Clone, Copy)]
pub struct CheckoutMetadata<'a> {
    pub user_id: &'a UserId,
    pub plan_id: &'a str,
    pub price_id: &'a str,
    pub coupon_id: Option<&'a str>,
    pub promotion_id: Option<&'a str>,
}

impl CheckoutMetadata<'_> {
    pub fn into_map(self) -> HashMap<String, String> {
        let mut map = HashMap::from([
            (METADATA_USER_ID.to_string(), self.user_id.to_string()),
            (METADATA_PLAN_ID.to_string(), self.plan_id.to_string()),
            (METADATA_PRICE_ID.to_string(), self.price_id.to_string()),
        ]);
        let optional = [
            (METADATA_COUPON_ID, self.coupon_id),
            (METADATA_PROMOTION_ID, self.promotion_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                map.insert(key.to_string(), value.to_string());
            }
        }
        map
    }
}

/// Trims a required string field, rejecting blanks.
pub fn require<'a>(field: &str, value: &'a str) -> Result<&'a str, BillingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BillingError::missing(field));
    }
    Ok(trimmed)
}
