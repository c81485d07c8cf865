//! Profile store that mirrors writes to a second datastore.
//!
//! Reads always come from the primary. Writes go to the primary first; the
//! mirror copy is best-effort and its failures are only logged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{PremiumRecord, UserProfile};
use crate::ports::{ProfileStore, StoreError, StoreErrorCode};

pub struct MirroredProfileStore {
    primary: Arc<dyn ProfileStore>,
    mirror: Arc<dyn ProfileStore>,
}

impl MirroredProfileStore {
    pub fn new(primary: Arc<dyn ProfileStore>, mirror: Arc<dyn ProfileStore>) -> Self {
        Self { primary, mirror }
    }

    /// Runs a mirror write, creating the mirror row once if it is missing.
    async fn mirror_write(&self, user_id: &UserId, write: MirrorWrite<'_>) {
        let mut result = write.apply(self.mirror.as_ref(), user_id).await;
        if matches!(&result, Err(e) if e.code == StoreErrorCode::NotFound) {
            result = match self.mirror.insert_minimal(user_id).await {
                Ok(_) => write.apply(self.mirror.as_ref(), user_id).await,
                Err(e) => Err(e),
            };
        }
        if let Err(e) = result {
            tracing::warn!(user_id = %user_id, write = write.name(), error = %e, "Mirror write failed");
        }
    }
}

#[derive(Clone, Copy)]
enum MirrorWrite<'a> {
    CustomerId(Option<&'a str>),
    Premium(&'a PremiumRecord),
}

impl MirrorWrite<'_> {
    fn name(&self) -> &'static str {
        match self {
            MirrorWrite::CustomerId(_) => "customer_id",
            MirrorWrite::Premium(_) => "premium",
        }
    }

    async fn apply(&self, store: &dyn ProfileStore, user_id: &UserId) -> Result<(), StoreError> {
        match self {
            MirrorWrite::CustomerId(customer_id) => store.set_customer_id(user_id, *customer_id).await,
            MirrorWrite::Premium(premium) => store.write_premium(user_id, premium).await,
        }
    }
}

#[async_trait]
impl ProfileStore for MirroredProfileStore {
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.primary.find_by_user_id(user_id).await
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        self.primary.find_by_customer_id(customer_id).await
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        self.primary.find_by_subscription_id(subscription_id).await
    }

    async fn insert_minimal(&self, user_id: &UserId) -> Result<UserProfile, StoreError> {
        self.primary.insert_minimal(user_id).await
    }

    async fn set_customer_id(
        &self,
        user_id: &UserId,
        customer_id: Option<&str>,
    ) -> Result<(), StoreError> {
        self.primary.set_customer_id(user_id, customer_id).await?;
        self.mirror_write(user_id, MirrorWrite::CustomerId(customer_id))
            .await;
        Ok(())
    }

    async fn write_premium(
        &self,
        user_id: &UserId,
        premium: &PremiumRecord,
    ) -> Result<(), StoreError> {
        self.primary.write_premium(user_id, premium).await?;
        self.mirror_write(user_id, MirrorWrite::Premium(premium)).await;
        Ok(())
    }

    async fn list_lapsed_active(
        &self,
        now: Timestamp,
        after: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<UserProfile>, StoreError> {
        self.primary.list_lapsed_active(now, after, limit).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.primary.ping().await
    }
}
