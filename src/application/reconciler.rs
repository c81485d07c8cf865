//! Reconciler - the single write path for `premium`.
//!
//! Every driver hands a Stripe subscription to `Reconciler::apply`, which
//! reads the current row, projects, and writes only when the projection says
//! it must. No caller ever builds or merges a premium record itself.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    project, project_vanished, BillingError, Projection, ProjectionDirective, ProjectionReason,
    Subscription, UserProfile,
};
use crate::ports::ProfileStore;

/// How to find the profile a subscription belongs to.
#[derive(Debug, Clone, Copy)]
pub enum ProfileTarget<'a> {
    /// The caller owns the user id; the row is created if missing.
    User(&'a UserId),
    /// Look up by customer id, falling back to a `metadata.userId` hint.
    Customer {
        customer_id: &'a str,
        user_hint: Option<&'a str>,
    },
}

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The projected record was written.
    Written {
        user_id: UserId,
        reason: ProjectionReason,
        was_active: bool,
        is_active: bool,
    },
    /// The projection required no write.
    Unchanged {
        user_id: UserId,
        reason: ProjectionReason,
    },
    /// No profile could be resolved for the subscription.
    ProfileMissing,
}

impl ReconcileOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ReconcileOutcome::Written { .. })
    }

    /// True if the write flipped entitlement.
    pub fn is_drift(&self) -> bool {
        matches!(self, ReconcileOutcome::Written { was_active, is_active, .. } if was_active != is_active)
    }
}

/// Projects Stripe state onto stored profiles.
#[derive(Clone)]
pub struct Reconciler {
    profiles: Arc<dyn ProfileStore>,
}

impl Reconciler {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Resolves the profile, projects `sub` onto it and writes if needed.
    pub async fn apply(
        &self,
        target: ProfileTarget<'_>,
        sub: &Subscription,
        directive: ProjectionDirective,
    ) -> Result<ReconcileOutcome, BillingError> {
        match self.resolve(target).await? {
            Some(profile) => self.apply_to_profile(&profile, sub, directive).await,
            None => {
                tracing::warn!(
                    subscription_id = %sub.id,
                    customer_id = %sub.customer_id,
                    "No profile for subscription; skipping projection"
                );
                Ok(ReconcileOutcome::ProfileMissing)
            }
        }
    }

    /// Projects onto an already loaded profile.
    pub async fn apply_to_profile(
        &self,
        profile: &UserProfile,
        sub: &Subscription,
        directive: ProjectionDirective,
    ) -> Result<ReconcileOutcome, BillingError> {
        let stored = profile.premium_record();
        let projection = project(stored, sub, directive, Timestamp::now());
        self.commit(profile, stored.map_or(false, |s| s.is_active), projection, &sub.id)
            .await
    }

    /// Marks the stored subscription canceled because Stripe no longer has it.
    pub async fn apply_vanished(
        &self,
        profile: &UserProfile,
    ) -> Result<ReconcileOutcome, BillingError> {
        let Some(stored) = profile.premium_record() else {
            return Ok(ReconcileOutcome::Unchanged {
                user_id: profile.id.clone(),
                reason: ProjectionReason::Unchanged,
            });
        };
        let projection = project_vanished(stored, Timestamp::now());
        let subscription_id = stored.stripe_subscription_id.clone().unwrap_or_default();
        self.commit(profile, stored.is_active, projection, &subscription_id)
            .await
    }

    async fn commit(
        &self,
        profile: &UserProfile,
        was_active: bool,
        projection: Projection,
        subscription_id: &str,
    ) -> Result<ReconcileOutcome, BillingError> {
        if !projection.must_write {
            tracing::debug!(
                user_id = %profile.id,
                subscription_id = %subscription_id,
                reason = projection.reason.as_str(),
                "Projection unchanged"
            );
            return Ok(ReconcileOutcome::Unchanged {
                user_id: profile.id.clone(),
                reason: projection.reason,
            });
        }

        self.profiles
            .write_premium(&profile.id, &projection.next)
            .await?;

        tracing::info!(
            user_id = %profile.id,
            subscription_id = %subscription_id,
            status = %projection.next.status,
            is_active = projection.next.is_active,
            reason = projection.reason.as_str(),
            "Premium record written"
        );

        Ok(ReconcileOutcome::Written {
            user_id: profile.id.clone(),
            reason: projection.reason,
            was_active,
            is_active: projection.next.is_active,
        })
    }

    async fn resolve(&self, target: ProfileTarget<'_>) -> Result<Option<UserProfile>, BillingError> {
        match target {
            ProfileTarget::User(user_id) => Ok(Some(self.load_or_create(user_id).await?)),
            ProfileTarget::Customer {
                customer_id,
                user_hint,
            } => {
                if let Some(profile) = self.profiles.find_by_customer_id(customer_id).await? {
                    return Ok(Some(profile));
                }
                let Some(hint) = user_hint else {
                    return Ok(None);
                };
                let user_id = UserId::new(hint)?;
                tracing::info!(
                    user_id = %user_id,
                    customer_id = %customer_id,
                    "Resolved profile through metadata userId"
                );
                Ok(Some(self.load_or_create(&user_id).await?))
            }
        }
    }

    /// Loads a profile, inserting an empty row the first time a user is seen.
    pub async fn load_or_create(&self, user_id: &UserId) -> Result<UserProfile, BillingError> {
        match self.profiles.find_by_user_id(user_id).await? {
            Some(profile) => Ok(profile),
            None => Ok(self.profiles.insert_minimal(user_id).await?),
        }
    }
}
