//! In-memory profile store for testing.
//!
//! Counts every write so tests can assert that a request changed nothing.
//! Lock poisoning is recovered from rather than propagated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{PremiumRecord, StoredPremium, UserProfile};
use crate::ports::{ProfileStore, StoreError};

/// In-memory `user_profiles`.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryProfileStore::new();
/// store.insert(UserProfile::minimal(user_id.clone()));
///
/// // ... drive a flow ...
///
/// assert_eq!(store.write_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
    writes: AtomicUsize,
    write_failure: Mutex<Option<StoreError>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a profile row, replacing any existing one.
    pub fn insert(&self, profile: UserProfile) {
        self.write_lock().insert(profile.id.clone(), profile);
    }

    /// Current row for a user.
    pub fn profile(&self, user_id: &UserId) -> Option<UserProfile> {
        self.read_lock().get(user_id).cloned()
    }

    /// Stored structured premium record for a user.
    pub fn premium(&self, user_id: &UserId) -> Option<PremiumRecord> {
        self.profile(user_id)
            .and_then(|p| p.premium_record().cloned())
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write fail with `error`.
    pub fn fail_writes(&self, error: StoreError) {
        *self.failure_lock() = Some(error);
    }

    pub fn clear_failures(&self) {
        *self.failure_lock() = None;
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<UserId, UserProfile>> {
        self.profiles.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<UserId, UserProfile>> {
        self.profiles.write().unwrap_or_else(|p| p.into_inner())
    }

    fn failure_lock(&self) -> MutexGuard<'_, Option<StoreError>> {
        self.write_failure.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure_lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn update<F>(&self, user_id: &UserId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UserProfile),
    {
        self.check_failure()?;
        let mut profiles = self.write_lock();
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found(format!("profile {}", user_id)))?;
        apply(profile);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.profile(user_id))
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let profiles = self.read_lock();
        let mut matches: Vec<&UserProfile> = profiles
            .values()
            .filter(|p| p.customer_id() == Some(customer_id))
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.first().map(|p| (*p).clone()))
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let profiles = self.read_lock();
        Ok(profiles
            .values()
            .find(|p| {
                matches!(
                    &p.premium,
                    Some(StoredPremium::Record(r))
                        if r.stripe_subscription_id.as_deref() == Some(subscription_id)
                )
            })
            .cloned())
    }

    async fn insert_minimal(&self, user_id: &UserId) -> Result<UserProfile, StoreError> {
        self.check_failure()?;
        let mut profiles = self.write_lock();
        if let Some(existing) = profiles.get(user_id) {
            return Ok(existing.clone());
        }
        let profile = UserProfile::minimal(user_id.clone());
        profiles.insert(user_id.clone(), profile.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(profile)
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update(user_id, |profile| {
            profile.stripe_customer_id = customer_id.map(str::to_string);
        })
    }

    async fn write_premium(
        &self,
        user_id: &UserId,
        premium: &PremiumRecord,
    ) -> Result<(), StoreError> {
        self.update(user_id, |profile| {
            if let Some(customer_id) = &premium.stripe_customer_id {
                profile.stripe_customer_id = Some(customer_id.clone());
            }
            profile.premium = Some(StoredPremium::Record(premium.clone()));
        })
    }

    async fn list_lapsed_active(
        &self,
        now: Timestamp,
        after: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<UserProfile>, StoreError> {
        let profiles = self.read_lock();
        let mut rows: Vec<UserProfile> = profiles
            .values()
            .filter(|p| after.map_or(true, |after| p.id > *after))
            .filter(|p| {
                p.premium_record().map_or(false, |r| {
                    r.is_active
                        && r.stripe_subscription_id.is_some()
                        && r.current_period_end.map_or(false, |end| end.is_before(&now))
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("U1").unwrap()
    }

    #[tokio::test]
    async fn insert_minimal_is_idempotent() {
        let store = InMemoryProfileStore::new();
        store.insert_minimal(&user()).await.unwrap();
        store.insert_minimal(&user()).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn writes_to_missing_profile_are_not_found() {
        let store = InMemoryProfileStore::new();
        let err = store.set_customer_id(&user(), Some("cus_1")).await.unwrap_err();
        assert_eq!(err.code, crate::ports::StoreErrorCode::NotFound);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn customer_lookup_uses_column() {
        let store = InMemoryProfileStore::new();
        store.insert_minimal(&user()).await.unwrap();
        store.set_customer_id(&user(), Some("cus_1")).await.unwrap();

        let found = store.find_by_customer_id("cus_1").await.unwrap().unwrap();
        assert_eq!(found.id, user());
        assert!(store.find_by_customer_id("cus_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lapsed_listing_skips_inactive_and_pages_by_id() {
        use crate::domain::subscription::SubscriptionStatus;

        let now = Timestamp::now();
        let store = InMemoryProfileStore::new();
        for (id, is_active, end) in [
            ("A", true, now.minus_days(1)),
            ("B", false, now.minus_days(1)),
            ("C", true, now.add_days(5)),
            ("D", true, now.minus_days(3)),
            ("E", true, now.minus_days(2)),
        ] {
            let mut profile = UserProfile::minimal(UserId::new(id).unwrap());
            profile.premium = Some(StoredPremium::Record(PremiumRecord {
                is_active,
                status: SubscriptionStatus::Active,
                plan_id: None,
                stripe_subscription_id: Some(format!("sub_{}", id)),
                stripe_customer_id: None,
                current_period_start: None,
                current_period_end: Some(end),
                cancel_at_period_end: false,
                canceled_at: None,
                reactivated_at: None,
                started_at: None,
                updated_at: None,
            }));
            store.insert(profile);
        }

        let first = store.list_lapsed_active(now, None, 2).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["A", "D"]);

        let rest = store
            .list_lapsed_active(now, Some(&first[1].id), 2)
            .await
            .unwrap();
        let ids: Vec<&str> = rest.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["E"]);
    }

    #[tokio::test]
    async fn injected_failure_blocks_writes() {
        let store = InMemoryProfileStore::new();
        store.insert_minimal(&user()).await.unwrap();
        store.fail_writes(StoreError::transport("down"));

        assert!(store.set_customer_id(&user(), Some("cus_1")).await.is_err());
        store.clear_failures();
        assert!(store.set_customer_id(&user(), Some("cus_1")).await.is_ok());
        assert_eq!(store.write_count(), 2);
    }
}
