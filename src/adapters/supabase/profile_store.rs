//! Supabase implementation of the ProfileStore port.
//!
//! Reads and patches `user_profiles` through PostgREST. Only the columns
//! this service owns are selected or written.

use async_trait::async_trait;
use serde::Serialize;

use super::client::SupabaseClient;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{PremiumRecord, UserProfile};
use crate::ports::{ProfileStore, StoreError};

const TABLE: &str = "user_profiles";
const COLUMNS: &str = "id,stripe_customer_id,premium";

/// PostgREST-backed profile store.
#[derive(Debug, Clone)]
pub struct SupabaseProfileStore {
    client: SupabaseClient,
}

#[derive(Serialize)]
struct CustomerIdPatch<'a> {
    stripe_customer_id: Option<&'a str>,
    updated_at: Timestamp,
}

#[derive(Serialize)]
struct PremiumPatch<'a> {
    premium: &'a PremiumRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    stripe_customer_id: Option<&'a str>,
    updated_at: Timestamp,
}

#[derive(Serialize)]
struct NewProfile<'a> {
    id: &'a UserId,
}

impl SupabaseProfileStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn first(&self, filter: (&str, String)) -> Result<Option<UserProfile>, StoreError> {
        let rows: Vec<UserProfile> = self
            .client
            .select(
                TABLE,
                &[filter, ("select", COLUMNS.to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// Double-quotes a value for use inside a PostgREST logic tree, where `,`
/// `(` and `)` are otherwise syntax.
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn customer_filter(customer_id: &str) -> (&'static str, String) {
    let id = quoted(customer_id);
    (
        "or",
        format!("(stripe_customer_id.eq.{id},premium->>stripeCustomerId.eq.{id})", id = id),
    )
}

/// Active records whose period ended before `now`, keyset-paged by id.
///
/// Instants are stored as RFC 3339 UTC text, so the text comparison on
/// `currentPeriodEnd` orders them correctly to the second.
fn lapsed_query(now: Timestamp, after: Option<&UserId>, limit: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("premium->>isActive", "eq.true".to_string()),
        ("premium->>currentPeriodEnd", format!("lt.{}", now.to_rfc3339())),
        ("premium->>stripeSubscriptionId", "not.is.null".to_string()),
        ("select", COLUMNS.to_string()),
        ("order", "id.asc".to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(after) = after {
        query.push(("id", format!("gt.{}", after.as_str())));
    }
    query
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.first(("id", eq(user_id.as_str()))).await
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        // Rows written before the column existed only carry the id inside premium.
        self.first(customer_filter(customer_id)).await
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        self.first(("premium->>stripeSubscriptionId", eq(subscription_id)))
            .await
    }

    async fn insert_minimal(&self, user_id: &UserId) -> Result<UserProfile, StoreError> {
        let inserted: Vec<UserProfile> = self
            .client
            .insert_ignoring_duplicates(TABLE, "id", &NewProfile { id: user_id })
            .await?;

        if let Some(profile) = inserted.into_iter().next() {
            tracing::info!(user_id = %user_id, "Created minimal profile");
            return Ok(profile);
        }
        // Duplicate skipped: the row already exists.
        self.find_by_user_id(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("profile {} vanished after insert", user_id)))
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated: Vec<serde_json::Value> = self
            .client
            .update(
                TABLE,
                &[("id", eq(user_id.as_str())), ("select", "id".to_string())],
                &CustomerIdPatch {
                    stripe_customer_id: customer_id,
                    updated_at: Timestamp::now(),
                },
            )
            .await?;
        if updated.is_empty() {
            return Err(StoreError::not_found(format!("profile {}", user_id)));
        }
        Ok(())
    }

    async fn write_premium(
        &self,
        user_id: &UserId,
        premium: &PremiumRecord,
    ) -> Result<(), StoreError> {
        let updated: Vec<serde_json::Value> = self
            .client
            .update(
                TABLE,
                &[("id", eq(user_id.as_str())), ("select", "id".to_string())],
                &PremiumPatch {
                    premium,
                    stripe_customer_id: premium.stripe_customer_id.as_deref(),
                    updated_at: premium.updated_at.unwrap_or_else(Timestamp::now),
                },
            )
            .await?;
        if updated.is_empty() {
            return Err(StoreError::not_found(format!("profile {}", user_id)));
        }
        Ok(())
    }

    async fn list_lapsed_active(
        &self,
        now: Timestamp,
        after: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<UserProfile>, StoreError> {
        self.client
            .select(TABLE, &lapsed_query(now, after, limit))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _: Vec<serde_json::Value> = self
            .client
            .select(TABLE, &[("select", "id".to_string()), ("limit", "1".to_string())])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::{StoredPremium, SubscriptionStatus};

    #[test]
    fn profile_row_with_structured_premium_parses() {
        let row = serde_json::json!({
            "id": "U1",
            "stripe_customer_id": "cus_1",
            "premium": {
                "isActive": true,
                "status": "active",
                "stripeSubscriptionId": "sub_a",
                "stripeCustomerId": "cus_1",
                "currentPeriodEnd": "2099-01-01T00:00:00Z",
                "cancelAtPeriodEnd": false
            }
        });
        let profile: UserProfile = serde_json::from_value(row).unwrap();
        let premium = profile.premium_record().unwrap();
        assert!(premium.is_active);
        assert_eq!(premium.status, SubscriptionStatus::Active);
        assert_eq!(profile.customer_id(), Some("cus_1"));
    }

    #[test]
    fn customer_filter_quotes_reserved_characters() {
        let (key, value) = customer_filter("cus_1,id.neq.x)");
        assert_eq!(key, "or");
        assert_eq!(
            value,
            r#"(stripe_customer_id.eq."cus_1,id.neq.x)",premium->>stripeCustomerId.eq."cus_1,id.neq.x)")"#
        );

        let (_, value) = customer_filter(r#"cus_"1"#);
        assert!(value.contains(r#"eq."cus_\"1""#));
    }

    #[test]
    fn lapsed_query_filters_in_store_and_pages_by_id() {
        let now = Timestamp::from_unix(Some(1_750_000_000)).unwrap();
        let first = lapsed_query(now, None, 500);
        assert!(first.contains(&("premium->>isActive", "eq.true".to_string())));
        assert!(first.contains(&(
            "premium->>currentPeriodEnd",
            format!("lt.{}", now.to_rfc3339())
        )));
        assert!(first.contains(&("order", "id.asc".to_string())));
        assert!(first.contains(&("limit", "500".to_string())));
        assert!(!first.iter().any(|(k, _)| *k == "id"));

        let after = UserId::new("U9").unwrap();
        let next = lapsed_query(now, Some(&after), 500);
        assert!(next.contains(&("id", "gt.U9".to_string())));
    }

    #[test]
    fn profile_row_with_boolean_premium_is_legacy() {
        let row = serde_json::json!({ "id": "U1", "stripe_customer_id": null, "premium": true });
        let profile: UserProfile = serde_json::from_value(row).unwrap();
        assert!(matches!(profile.premium, Some(StoredPremium::Legacy(_))));
        assert!(profile.premium_record().is_none());
    }

    #[test]
    fn premium_patch_sets_customer_column_alongside_record() {
        let record = PremiumRecord {
            is_active: false,
            status: SubscriptionStatus::Canceled,
            plan_id: None,
            stripe_subscription_id: Some("sub_a".to_string()),
            stripe_customer_id: Some("cus_1".to_string()),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            reactivated_at: None,
            started_at: None,
            updated_at: None,
        };
        let patch = PremiumPatch {
            premium: &record,
            stripe_customer_id: record.stripe_customer_id.as_deref(),
            updated_at: Timestamp::from_unix(Some(1_710_000_000)).unwrap(),
        };
        let body = serde_json::to_value(&patch).unwrap();
        assert_eq!(body["stripe_customer_id"], "cus_1");
        assert_eq!(body["premium"]["stripeSubscriptionId"], "sub_a");
        assert_eq!(body["premium"]["isActive"], false);
    }
}
