//! State projector.
//!
//! Pure mapping from `(stored premium, Stripe subscription)` to the next
//! premium record. Every driver writes through here; nothing else builds a
//! `PremiumRecord`.

use super::premium::PremiumRecord;
use super::status::SubscriptionStatus;
use super::subscription::Subscription;
use crate::domain::foundation::Timestamp;

/// Driver-supplied override applied on top of the observed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionDirective {
    /// Mirror Stripe as-is.
    Observe,
    /// The subscription was deleted; force `canceled`.
    Canceled,
    /// An invoice payment failed; force `past_due` while still live.
    PaymentFailed,
    /// The user explicitly reactivated a pending cancellation.
    Reactivated,
}

/// Why the projector decided as it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionReason {
    /// No structured record was stored.
    Initial,
    /// At least one observable field differs.
    Changed,
    /// Nothing observable differs.
    Unchanged,
    /// The stored `updatedAt` is later than now; writing would regress it.
    ClockRegression,
    /// A different live subscription is attached and this one is terminal.
    Superseded,
}

impl ProjectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionReason::Initial => "initial",
            ProjectionReason::Changed => "changed",
            ProjectionReason::Unchanged => "unchanged",
            ProjectionReason::ClockRegression => "clock_regression",
            ProjectionReason::Superseded => "superseded",
        }
    }
}

/// Output of a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub next: PremiumRecord,
    pub must_write: bool,
    pub reason: ProjectionReason,
}

/// Projects a Stripe subscription onto the stored premium record.
pub fn project(
    stored: Option<&PremiumRecord>,
    sub: &Subscription,
    directive: ProjectionDirective,
    now: Timestamp,
) -> Projection {
    let same = stored.filter(|s| s.stripe_subscription_id.as_deref() == Some(sub.id.as_str()));

    let status = match directive {
        ProjectionDirective::Canceled => SubscriptionStatus::Canceled,
        ProjectionDirective::PaymentFailed if sub.status.is_live() => SubscriptionStatus::PastDue,
        _ => sub.status,
    };

    let (current_period_start, current_period_end) =
        match (sub.current_period_start, sub.current_period_end) {
            (Some(start), Some(end)) if start > end => (Some(end), Some(end)),
            bounds => bounds,
        };

    let is_active = PremiumRecord::entitled_at(status, current_period_end, now);

    let started_at = stored
        .and_then(|s| s.started_at)
        .or_else(|| is_active.then(|| sub.start_date.unwrap_or(now)));

    let was_pending_cancel = same.map_or(false, |s| s.cancel_at_period_end);
    let reactivating = status.is_live()
        && !sub.cancel_at_period_end
        && (was_pending_cancel || directive == ProjectionDirective::Reactivated);

    let canceled_at = if status == SubscriptionStatus::Canceled || sub.cancel_at_period_end {
        sub.canceled_at
            .or_else(|| same.and_then(|s| s.canceled_at))
            .or(Some(now))
    } else {
        None
    };

    let reactivated_at = if status == SubscriptionStatus::Canceled {
        None
    } else if reactivating && (was_pending_cancel || same.and_then(|s| s.reactivated_at).is_none())
    {
        Some(now)
    } else {
        same.and_then(|s| s.reactivated_at)
    };

    let mut next = PremiumRecord {
        is_active,
        status,
        plan_id: sub.plan_id().or_else(|| same.and_then(|s| s.plan_id.clone())),
        stripe_subscription_id: Some(sub.id.clone()),
        stripe_customer_id: Some(sub.customer_id.clone()),
        current_period_start,
        current_period_end,
        cancel_at_period_end: sub.cancel_at_period_end && status.is_live(),
        canceled_at,
        reactivated_at,
        started_at,
        updated_at: Some(now),
    };

    decide(stored, &mut next, now, || {
        stored.map_or(false, |s| {
            s.stripe_subscription_id.is_some()
                && s.stripe_subscription_id.as_deref() != Some(sub.id.as_str())
                && s.status.is_live()
                && !status.is_live()
        })
    })
}

/// Projects a subscription Stripe no longer knows about.
///
/// The stored record is kept but marked canceled and inactive.
pub fn project_vanished(stored: &PremiumRecord, now: Timestamp) -> Projection {
    let mut next = PremiumRecord {
        is_active: false,
        status: SubscriptionStatus::Canceled,
        cancel_at_period_end: false,
        canceled_at: stored.canceled_at.or(Some(now)),
        reactivated_at: None,
        updated_at: Some(now),
        ..stored.clone()
    };

    decide(Some(stored), &mut next, now, || false)
}

fn decide(
    stored: Option<&PremiumRecord>,
    next: &mut PremiumRecord,
    now: Timestamp,
    superseded: impl FnOnce() -> bool,
) -> Projection {
    let Some(stored) = stored else {
        return Projection {
            next: next.clone(),
            must_write: true,
            reason: ProjectionReason::Initial,
        };
    };

    if superseded() {
        return Projection {
            next: stored.clone(),
            must_write: false,
            reason: ProjectionReason::Superseded,
        };
    }

    if next.same_observable_state(stored) {
        next.updated_at = stored.updated_at;
        return Projection {
            next: next.clone(),
            must_write: false,
            reason: ProjectionReason::Unchanged,
        };
    }

    if stored.updated_at.map_or(false, |prev| prev.is_after(&now)) {
        return Projection {
            next: stored.clone(),
            must_write: false,
            reason: ProjectionReason::ClockRegression,
        };
    }

    Projection {
        next: next.clone(),
        must_write: true,
        reason: ProjectionReason::Changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::subscription::fixtures::active_subscription;
    use crate::domain::subscription::subscription::METADATA_PLAN_ID;

    fn now() -> Timestamp {
        Timestamp::from_unix(Some(1_710_000_000)).unwrap()
    }

    fn later(secs: i64) -> Timestamp {
        now().plus_secs(secs)
    }

    // ══════════════════════════════════════════════════════════════
    // Initial projection
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn initial_projection_always_writes() {
        let sub = active_subscription("sub_a");
        let p = project(None, &sub, ProjectionDirective::Observe, now());

        assert!(p.must_write);
        assert_eq!(p.reason, ProjectionReason::Initial);
        assert!(p.next.is_active);
        assert_eq!(p.next.status, SubscriptionStatus::Active);
        assert_eq!(p.next.stripe_subscription_id.as_deref(), Some("sub_a"));
        assert_eq!(p.next.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(p.next.plan_id.as_deref(), Some("price_123"));
        assert_eq!(p.next.started_at, sub.start_date);
        assert_eq!(p.next.updated_at, Some(now()));
    }

    #[test]
    fn plan_id_comes_from_metadata_when_present() {
        let mut sub = active_subscription("sub_a");
        sub.metadata
            .insert(METADATA_PLAN_ID.to_string(), "plan_yearly".to_string());
        let p = project(None, &sub, ProjectionDirective::Observe, now());
        assert_eq!(p.next.plan_id.as_deref(), Some("plan_yearly"));
    }

    #[test]
    fn period_in_the_past_is_not_active() {
        let mut sub = active_subscription("sub_a");
        sub.current_period_end = Some(now().plus_secs(-10));
        sub.current_period_start = Some(now().plus_secs(-100));
        let p = project(None, &sub, ProjectionDirective::Observe, now());
        assert!(!p.next.is_active);
        assert!(p.next.started_at.is_none());
    }

    #[test]
    fn missing_period_end_counts_as_open() {
        let mut sub = active_subscription("sub_a");
        sub.current_period_end = None;
        let p = project(None, &sub, ProjectionDirective::Observe, now());
        assert!(p.next.is_active);
    }

    #[test]
    fn inverted_period_bounds_are_clamped() {
        let mut sub = active_subscription("sub_a");
        sub.current_period_start = Some(later(1000));
        sub.current_period_end = Some(later(500));
        let p = project(None, &sub, ProjectionDirective::Observe, now());
        assert_eq!(p.next.current_period_start, Some(later(500)));
        assert_eq!(p.next.current_period_end, Some(later(500)));
    }

    #[test]
    fn started_at_falls_back_to_now_without_start_date() {
        let mut sub = active_subscription("sub_a");
        sub.start_date = None;
        let p = project(None, &sub, ProjectionDirective::Observe, now());
        assert_eq!(p.next.started_at, Some(now()));
    }

    // ══════════════════════════════════════════════════════════════
    // Idempotence and monotonic updatedAt
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn reprojecting_same_state_does_not_write() {
        let sub = active_subscription("sub_a");
        let first = project(None, &sub, ProjectionDirective::Observe, now());
        let second = project(Some(&first.next), &sub, ProjectionDirective::Observe, later(60));

        assert!(!second.must_write);
        assert_eq!(second.reason, ProjectionReason::Unchanged);
        assert_eq!(second.next, first.next);
    }

    #[test]
    fn change_is_written_with_new_updated_at() {
        let sub = active_subscription("sub_a");
        let first = project(None, &sub, ProjectionDirective::Observe, now());

        let mut past_due = sub.clone();
        past_due.status = SubscriptionStatus::PastDue;
        let second = project(Some(&first.next), &past_due, ProjectionDirective::Observe, later(60));

        assert!(second.must_write);
        assert_eq!(second.reason, ProjectionReason::Changed);
        assert!(!second.next.is_active);
        assert_eq!(second.next.updated_at, Some(later(60)));
        assert_eq!(second.next.started_at, first.next.started_at);
    }

    #[test]
    fn stored_updated_at_in_future_skips_write() {
        let sub = active_subscription("sub_a");
        let mut stored = project(None, &sub, ProjectionDirective::Observe, later(3600)).next;
        stored.status = SubscriptionStatus::PastDue;
        stored.is_active = false;

        let p = project(Some(&stored), &sub, ProjectionDirective::Observe, now());

        assert!(!p.must_write);
        assert_eq!(p.reason, ProjectionReason::ClockRegression);
        assert_eq!(p.next, stored);
    }

    // ══════════════════════════════════════════════════════════════
    // Directives
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn canceled_directive_forces_canceled_and_inactive() {
        let sub = active_subscription("sub_a");
        let stored = project(None, &sub, ProjectionDirective::Observe, now()).next;

        let p = project(Some(&stored), &sub, ProjectionDirective::Canceled, later(10));

        assert!(p.must_write);
        assert_eq!(p.next.status, SubscriptionStatus::Canceled);
        assert!(!p.next.is_active);
        assert_eq!(p.next.canceled_at, Some(later(10)));
        assert!(p.next.reactivated_at.is_none());
        assert!(!p.next.cancel_at_period_end);
    }

    #[test]
    fn canceled_at_prefers_stripe_value() {
        let mut sub = active_subscription("sub_a");
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(later(-500));
        let p = project(None, &sub, ProjectionDirective::Observe, now());
        assert_eq!(p.next.canceled_at, Some(later(-500)));
    }

    #[test]
    fn payment_failed_forces_past_due() {
        let sub = active_subscription("sub_a");
        let p = project(None, &sub, ProjectionDirective::PaymentFailed, now());
        assert_eq!(p.next.status, SubscriptionStatus::PastDue);
        assert!(!p.next.is_active);
    }

    #[test]
    fn payment_failed_never_resurrects_canceled_subscription() {
        let mut sub = active_subscription("sub_a");
        sub.status = SubscriptionStatus::Canceled;
        let p = project(None, &sub, ProjectionDirective::PaymentFailed, now());
        assert_eq!(p.next.status, SubscriptionStatus::Canceled);
    }

    // ══════════════════════════════════════════════════════════════
    // Cancel / reactivate round trip
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn cancel_then_reactivate_keeps_user_active() {
        let sub = active_subscription("sub_a");
        let initial = project(None, &sub, ProjectionDirective::Observe, now()).next;

        let mut canceling = sub.clone();
        canceling.cancel_at_period_end = true;
        canceling.canceled_at = Some(later(100));
        let after_cancel = project(Some(&initial), &canceling, ProjectionDirective::Observe, later(100));
        assert!(after_cancel.must_write);
        assert!(after_cancel.next.is_active);
        assert!(after_cancel.next.cancel_at_period_end);
        assert_eq!(after_cancel.next.canceled_at, Some(later(100)));
        assert_eq!(after_cancel.next.status, SubscriptionStatus::Active);

        let reactivated = project(
            Some(&after_cancel.next),
            &sub,
            ProjectionDirective::Reactivated,
            later(200),
        );
        assert!(reactivated.must_write);
        assert!(reactivated.next.is_active);
        assert!(!reactivated.next.cancel_at_period_end);
        assert!(reactivated.next.canceled_at.is_none());
        assert_eq!(reactivated.next.reactivated_at, Some(later(200)));
        assert_eq!(reactivated.next.status, SubscriptionStatus::Active);
    }

    #[test]
    fn reactivation_observed_via_webhook_sets_reactivated_at() {
        let mut canceling = active_subscription("sub_a");
        canceling.cancel_at_period_end = true;
        let stored = project(None, &canceling, ProjectionDirective::Observe, now()).next;

        let sub = active_subscription("sub_a");
        let p = project(Some(&stored), &sub, ProjectionDirective::Observe, later(5));
        assert_eq!(p.next.reactivated_at, Some(later(5)));
        assert!(p.next.canceled_at.is_none());
    }

    #[test]
    fn replayed_reactivation_is_idempotent() {
        let mut canceling = active_subscription("sub_a");
        canceling.cancel_at_period_end = true;
        let stored = project(None, &canceling, ProjectionDirective::Observe, now()).next;
        let sub = active_subscription("sub_a");
        let first = project(Some(&stored), &sub, ProjectionDirective::Reactivated, later(5));
        let again = project(Some(&first.next), &sub, ProjectionDirective::Reactivated, later(9));
        assert!(!again.must_write);
        assert_eq!(again.next.reactivated_at, Some(later(5)));
    }

    // ══════════════════════════════════════════════════════════════
    // Superseded and vanished subscriptions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn terminal_old_subscription_does_not_replace_live_one() {
        let current = project(None, &active_subscription("sub_new"), ProjectionDirective::Observe, now()).next;

        let mut old = active_subscription("sub_old");
        old.status = SubscriptionStatus::Canceled;
        let p = project(Some(&current), &old, ProjectionDirective::Observe, later(10));

        assert!(!p.must_write);
        assert_eq!(p.reason, ProjectionReason::Superseded);
        assert_eq!(p.next, current);
    }

    #[test]
    fn new_live_subscription_replaces_old_canceled_one() {
        let mut old = active_subscription("sub_old");
        old.status = SubscriptionStatus::Canceled;
        let stored = project(None, &old, ProjectionDirective::Observe, now()).next;

        let p = project(Some(&stored), &active_subscription("sub_new"), ProjectionDirective::Observe, later(10));
        assert!(p.must_write);
        assert_eq!(p.next.stripe_subscription_id.as_deref(), Some("sub_new"));
        assert!(p.next.is_active);
        assert!(p.next.canceled_at.is_none());
    }

    #[test]
    fn vanished_subscription_becomes_canceled() {
        let stored = project(None, &active_subscription("sub_a"), ProjectionDirective::Observe, now()).next;
        let p = project_vanished(&stored, later(10));

        assert!(p.must_write);
        assert!(!p.next.is_active);
        assert_eq!(p.next.status, SubscriptionStatus::Canceled);
        assert_eq!(p.next.canceled_at, Some(later(10)));
        assert_eq!(p.next.stripe_subscription_id.as_deref(), Some("sub_a"));

        let again = project_vanished(&p.next, later(20));
        assert!(!again.must_write);
    }

    #[test]
    fn every_projection_satisfies_invariants() {
        let mut sub = active_subscription("sub_a");
        for status in SubscriptionStatus::ALL {
            sub.status = status;
            for directive in [
                ProjectionDirective::Observe,
                ProjectionDirective::Canceled,
                ProjectionDirective::PaymentFailed,
                ProjectionDirective::Reactivated,
            ] {
                let p = project(None, &sub, directive, now());
                assert!(p.next.holds_invariants(now()), "{:?} {:?}", status, directive);
            }
        }
    }
}
