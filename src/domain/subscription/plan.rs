//! Locally mirrored premium plans and the money math around them.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use super::errors::BillingError;

/// Currency used when a plan row leaves it blank.
pub const DEFAULT_CURRENCY: &str = "usd";

/// Stripe currencies whose amounts carry no minor unit.
const ZERO_DECIMAL_CURRENCIES: [&str; 16] = [
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// Billing cadence of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanInterval {
    Weekly,
    Monthly,
    Yearly,
    OneOff,
}

impl PlanInterval {
    /// Reads the `interval` column. Anything unrecognized is a one-off charge.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("weekly") | Some("week") => PlanInterval::Weekly,
            Some("monthly") | Some("month") => PlanInterval::Monthly,
            Some("yearly") | Some("year") | Some("annual") => PlanInterval::Yearly,
            _ => PlanInterval::OneOff,
        }
    }

    /// Stripe `recurring[interval]` value, `None` for one-off prices.
    pub fn stripe_interval(&self) -> Option<&'static str> {
        match self {
            PlanInterval::Weekly => Some("week"),
            PlanInterval::Monthly => Some("month"),
            PlanInterval::Yearly => Some("year"),
            PlanInterval::OneOff => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanInterval::Weekly => "weekly",
            PlanInterval::Monthly => "monthly",
            PlanInterval::Yearly => "yearly",
            PlanInterval::OneOff => "one_off",
        }
    }
}

/// Row of `premium_plans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "decimal")]
    pub price: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub stripe_product_id: Option<String>,
    #[serde(default)]
    pub stripe_price_id: Option<String>,
}

impl Plan {
    /// Lower-cased currency code, defaulting to USD.
    pub fn currency(&self) -> String {
        normalize_currency(self.currency.as_deref())
    }

    pub fn interval(&self) -> PlanInterval {
        PlanInterval::parse(self.interval.as_deref())
    }

    /// Price in the currency's minor unit.
    pub fn amount_minor(&self) -> Result<i64, BillingError> {
        to_minor_units(self.price, &self.currency())
    }

    /// Idempotency key for creating this plan's Stripe product.
    pub fn product_idempotency_key(&self) -> Result<String, BillingError> {
        Ok(idempotency_key(
            "product",
            &self.id,
            self.amount_minor()?,
            &self.currency(),
            self.interval(),
        ))
    }

    /// Idempotency key for creating this plan's Stripe price.
    pub fn price_idempotency_key(&self) -> Result<String, BillingError> {
        Ok(idempotency_key(
            "price",
            &self.id,
            self.amount_minor()?,
            &self.currency(),
            self.interval(),
        ))
    }
}

/// Lower-cases a currency code, defaulting to USD when absent or blank.
pub fn normalize_currency(currency: Option<&str>) -> String {
    currency
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

/// Returns true if Stripe amounts in this currency have no minor unit.
pub fn is_zero_decimal(currency: &str) -> bool {
    ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_lowercase().as_str())
}

/// Converts a major-unit amount into Stripe's integer minor units.
pub fn to_minor_units(amount: f64, currency: &str) -> Result<i64, BillingError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(BillingError::validation(
            "price",
            format!("Invalid amount: {}", amount),
        ));
    }
    let scale = if is_zero_decimal(currency) { 1.0 } else { 100.0 };
    Ok((amount * scale).round() as i64)
}

/// Converts Stripe minor units back into a major-unit amount.
pub fn from_minor_units(amount: i64, currency: &str) -> f64 {
    if is_zero_decimal(currency) {
        amount as f64
    } else {
        amount as f64 / 100.0
    }
}

/// Deterministic key so retried product/price writes collapse at Stripe.
pub fn idempotency_key(
    kind: &str,
    plan_id: &str,
    amount_minor: i64,
    currency: &str,
    interval: PlanInterval,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}:{}:{}:{}:{}",
            kind,
            plan_id,
            amount_minor,
            currency,
            interval.as_str()
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

/// PostgREST serializes `numeric` as a number, older views as a string.
fn decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
