//! The stored `premium` record and the profile row that carries it.

use serde::{Deserialize, Serialize};

use super::status::SubscriptionStatus;
use crate::domain::foundation::{Timestamp, UserId};

/// Structured `premium` value persisted on `user_profiles`.
///
/// Every write replaces the whole object; fields are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumRecord {
    pub is_active: bool,
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<Timestamp>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactivated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl PremiumRecord {
    /// Entitlement rule: entitled status and a period that has not ended.
    pub fn entitled_at(
        status: SubscriptionStatus,
        current_period_end: Option<Timestamp>,
        at: Timestamp,
    ) -> bool {
        status.is_entitled() && current_period_end.map_or(true, |end| end.is_after(&at))
    }

    /// Checks the record-local invariants as of `at`.
    pub fn holds_invariants(&self, at: Timestamp) -> bool {
        let active_ok =
            self.is_active == Self::entitled_at(self.status, self.current_period_end, at);
        let customer_ok =
            self.stripe_subscription_id.is_none() || self.stripe_customer_id.is_some();
        let period_ok = match (self.current_period_start, self.current_period_end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        active_ok && customer_ok && period_ok
    }

    /// Compares every observable field except `updatedAt`.
    pub fn same_observable_state(&self, other: &PremiumRecord) -> bool {
        let mut a = self.clone();
        a.updated_at = None;
        let mut b = other.clone();
        b.updated_at = None;
        a == b
    }
}

/// A `premium` column value as read from the store.
///
/// Older writers stored a bare boolean; anything that does not parse as a
/// structured record is kept as `Legacy` and treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredPremium {
    Record(PremiumRecord),
    Legacy(serde_json::Value),
}

/// Row of `user_profiles` restricted to the columns this service owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub premium: Option<StoredPremium>,
}

impl UserProfile {
    /// Creates an empty profile for a user with no billing state.
    pub fn minimal(id: UserId) -> Self {
        Self {
            id,
            stripe_customer_id: None,
            premium: None,
        }
    }

    /// Structured premium record, if one is stored.
    pub fn premium_record(&self) -> Option<&PremiumRecord> {
        match &self.premium {
            Some(StoredPremium::Record(record)) => Some(record),
            Some(StoredPremium::Legacy(value)) => {
                tracing::warn!(
                    user_id = %self.id,
                    legacy_value = %value,
                    "Ignoring non-structured premium value"
                );
                None
            }
            None => None,
        }
    }

    /// Returns true if the stored record says the user is entitled.
    pub fn is_premium_active(&self) -> bool {
        self.premium_record().map_or(false, |p| p.is_active)
    }

    /// Customer id, preferring the column over the premium record.
    pub fn customer_id(&self) -> Option<&str> {
        self.stripe_customer_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.premium_record()
                    .and_then(|p| p.stripe_customer_id.as_deref())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PremiumRecord {
        PremiumRecord {
            is_active: true,
            status: SubscriptionStatus::Active,
            plan_id: Some("plan_monthly".to_string()),
            stripe_subscription_id: Some("sub_a".to_string()),
            stripe_customer_id: Some("cus_1".to_string()),
            current_period_start: Timestamp::from_unix(Some(1_704_067_200)),
            current_period_end: Timestamp::from_unix(Some(4_859_827_200)),
            cancel_at_period_end: false,
            canceled_at: None,
            reactivated_at: None,
            started_at: Timestamp::from_unix(Some(1_704_067_200)),
            updated_at: Timestamp::from_unix(Some(1_704_067_300)),
        }
    }

    #[test]
    fn serializes_with_camel_case_keys_and_omits_nulls() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["isActive"], true);
        assert_eq!(json["status"], "active");
        assert_eq!(json["stripeSubscriptionId"], "sub_a");
        assert_eq!(json["currentPeriodEnd"], "2124-01-01T00:00:00Z");
        assert!(json.get("canceledAt").is_none());
    }

    #[test]
    fn profile_reads_structured_premium() {
        let json = serde_json::json!({
            "id": "U1",
            "stripe_customer_id": "cus_1",
            "premium": serde_json::to_value(record()).unwrap(),
        });
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.premium_record(), Some(&record()));
        assert!(profile.is_premium_active());
    }

    #[test]
    fn profile_treats_boolean_premium_as_absent() {
        let json = serde_json::json!({ "id": "U1", "premium": true });
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert!(matches!(profile.premium, Some(StoredPremium::Legacy(_))));
        assert!(profile.premium_record().is_none());
        assert!(!profile.is_premium_active());
    }

    #[test]
    fn profile_with_null_premium_has_no_record() {
        let json = serde_json::json!({ "id": "U1", "stripe_customer_id": null, "premium": null });
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert!(profile.premium.is_none());
        assert_eq!(profile.customer_id(), None);
    }

    #[test]
    fn customer_id_falls_back_to_premium_record() {
        let mut profile = UserProfile::minimal(UserId::new("U1").unwrap());
        profile.premium = Some(StoredPremium::Record(record()));
        assert_eq!(profile.customer_id(), Some("cus_1"));
        profile.stripe_customer_id = Some("cus_col".to_string());
        assert_eq!(profile.customer_id(), Some("cus_col"));
    }

    #[test]
    fn invariants_hold_for_consistent_record() {
        let at = Timestamp::from_unix(Some(1_704_067_400)).unwrap();
        assert!(record().holds_invariants(at));
    }

    #[test]
    fn invariants_catch_active_flag_after_period_end() {
        let mut r = record();
        r.current_period_end = Timestamp::from_unix(Some(1_704_067_250));
        let at = Timestamp::from_unix(Some(1_704_067_400)).unwrap();
        assert!(!r.holds_invariants(at));
    }

    #[test]
    fn observable_comparison_ignores_updated_at() {
        let a = record();
        let mut b = record();
        b.updated_at = None;
        assert!(a.same_observable_state(&b));
        b.cancel_at_period_end = true;
        assert!(!a.same_observable_state(&b));
    }
}
