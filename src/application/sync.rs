//! SyncEngine - periodic reconciliation against Stripe.
//!
//! Each cycle runs three phases in order:
//!
//! 1. **Adopt** - active subscriptions at Stripe are projected onto the
//!    profiles that own their customers.
//! 2. **Expire** - locally active records whose period has ended are checked
//!    against Stripe and projected again. The store is paged by user id until
//!    exhausted, so every lapsed record is seen each cycle.
//! 3. **Absorb** - recently canceled subscriptions still shown as live
//!    locally are projected as canceled. The owner is found by customer id,
//!    falling back to the subscription id stored in the record.
//!
//! Per-entity failures are logged and counted; a failure to list at all
//! aborts the cycle. Runs are single-flight per process: a run requested
//! while one is in progress is dropped.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 60 min | Time between cycles |
//! | `adopt_limit` | 100 | Active subscriptions listed per cycle |
//! | `absorb_limit` | 50 | Canceled subscriptions listed per cycle |
//! | `scan_page_size` | 1000 | Profiles read per page when expiring stale records |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::application::reconciler::Reconciler;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    BillingError, ProjectionDirective, Subscription, SubscriptionStatus, UserProfile,
};
use crate::ports::{PaymentProvider, ProfileStore, StoreError, SubscriptionQuery};

/// Consecutive whole-cycle failures before the engine resets itself.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub interval: Duration,
    pub adopt_limit: u32,
    pub absorb_limit: u32,
    pub scan_page_size: u32,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            adopt_limit: 100,
            absorb_limit: 50,
            scan_page_size: 1000,
        }
    }
}

impl SyncEngineConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Counts from one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub adopted: u32,
    pub expired: u32,
    pub absorbed: u32,
    pub failed: u32,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl SyncReport {
    fn started(at: Timestamp) -> Self {
        Self {
            adopted: 0,
            expired: 0,
            absorbed: 0,
            failed: 0,
            started_at: at,
            finished_at: at,
        }
    }
}

/// Snapshot served by the sync-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub running: bool,
    pub last_sync_time: Option<Timestamp>,
    pub sync_count: u64,
    pub interval_minutes: u64,
    pub consecutive_failures: u32,
    pub last_report: Option<SyncReport>,
}

/// Result of asking for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRun {
    Completed(SyncReport),
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct SyncState {
    last_sync_time: Option<Timestamp>,
    sync_count: u64,
    consecutive_failures: u32,
    last_report: Option<SyncReport>,
}

/// Clears the running flag when a run ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    payments: Arc<dyn PaymentProvider>,
    profiles: Arc<dyn ProfileStore>,
    reconciler: Reconciler,
    config: SyncEngineConfig,
    running: AtomicBool,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        profiles: Arc<dyn ProfileStore>,
        reconciler: Reconciler,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            payments,
            profiles,
            reconciler,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.state();
        SyncStatus {
            running: self.running.load(Ordering::Acquire),
            last_sync_time: state.last_sync_time,
            sync_count: state.sync_count,
            interval_minutes: self.config.interval.as_secs() / 60,
            consecutive_failures: state.consecutive_failures,
            last_report: state.last_report.clone(),
        }
    }

    /// Runs one cycle unless one is already in progress.
    pub async fn run_once(&self) -> Result<SyncRun, BillingError> {
        let Some(flight) = FlightGuard::acquire(&self.running) else {
            tracing::info!("Sync already running; request dropped");
            return Ok(SyncRun::AlreadyRunning);
        };

        let error = match self.cycle().await {
            Ok(report) => return Ok(SyncRun::Completed(self.record_success(report))),
            Err(e) => e,
        };
        let failures = self.record_failure(&error);
        if failures < MAX_CONSECUTIVE_FAILURES {
            return Err(error);
        }

        drop(flight);
        self.state().consecutive_failures = 0;
        tracing::error!(
            failures,
            "Sync failed repeatedly; resetting and running a fresh cycle"
        );

        let Some(_flight) = FlightGuard::acquire(&self.running) else {
            return Ok(SyncRun::AlreadyRunning);
        };
        match self.cycle().await {
            Ok(report) => Ok(SyncRun::Completed(self.record_success(report))),
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Starts a run in the background and returns immediately.
    pub fn trigger(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.run_once().await {
                tracing::warn!(error = %e, "Triggered sync failed");
            }
        });
    }

    /// Runs cycles on the configured interval until shutdown is signalled.
    pub async fn run_periodic(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        tracing::info!(
            interval_minutes = self.config.interval.as_secs() / 60,
            "Periodic sync started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Periodic sync stopped");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "Periodic sync cycle failed");
                    }
                }
            }
        }
    }

    async fn cycle(&self) -> Result<SyncReport, BillingError> {
        let mut report = SyncReport::started(Timestamp::now());
        tracing::info!("Sync cycle started");

        self.adopt_actives(&mut report).await?;
        self.expire_stale(&mut report).await?;
        self.absorb_cancels(&mut report).await?;

        report.finished_at = Timestamp::now();
        tracing::info!(
            adopted = report.adopted,
            expired = report.expired,
            absorbed = report.absorbed,
            failed = report.failed,
            "Sync cycle finished"
        );
        Ok(report)
    }

    async fn adopt_actives(&self, report: &mut SyncReport) -> Result<(), BillingError> {
        let subs = self
            .payments
            .list_subscriptions(SubscriptionQuery {
                customer_id: None,
                status: Some(SubscriptionStatus::Active),
                limit: self.config.adopt_limit,
            })
            .await?;

        for sub in &subs {
            let profile = match self.profiles.find_by_customer_id(&sub.customer_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => continue,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(customer_id = %sub.customer_id, error = %e, "Profile lookup failed");
                    continue;
                }
            };

            match self
                .reconciler
                .apply_to_profile(&profile, sub, ProjectionDirective::Observe)
                .await
            {
                Ok(outcome) => {
                    if outcome.is_drift() {
                        tracing::warn!(
                            user_id = %profile.id,
                            subscription_id = %sub.id,
                            "Drift corrected: active at Stripe, inactive locally"
                        );
                    }
                    if outcome.is_written() {
                        report.adopted += 1;
                    }
                }
                Err(e) => self.entity_failed(report, &profile, &sub.id, &e),
            }
        }
        Ok(())
    }

    async fn expire_stale(&self, report: &mut SyncReport) -> Result<(), BillingError> {
        let now = Timestamp::now();
        let page_size = self.config.scan_page_size.max(1);
        let mut after: Option<UserId> = None;

        loop {
            let page = self
                .profiles
                .list_lapsed_active(now, after.as_ref(), page_size)
                .await?;
            for profile in &page {
                self.expire_one(profile, now, report).await;
            }
            match page.last() {
                Some(last) if page.len() >= page_size as usize => after = Some(last.id.clone()),
                _ => break,
            }
        }
        Ok(())
    }

    async fn expire_one(&self, profile: &UserProfile, now: Timestamp, report: &mut SyncReport) {
        let Some(record) = profile.premium_record() else {
            return;
        };
        let ended = record.current_period_end.map_or(false, |end| end.is_before(&now));
        let Some(subscription_id) = record.stripe_subscription_id.as_deref() else {
            return;
        };
        if !record.is_active || !ended {
            return;
        }

        let result = match self.payments.get_subscription(subscription_id).await {
            Ok(Some(sub)) => {
                self.reconciler
                    .apply_to_profile(profile, &sub, ProjectionDirective::Observe)
                    .await
            }
            Ok(None) => {
                tracing::warn!(
                    user_id = %profile.id,
                    subscription_id = %subscription_id,
                    "Subscription no longer exists at Stripe"
                );
                self.reconciler.apply_vanished(profile).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(outcome) if outcome.is_drift() => report.expired += 1,
            Ok(_) => {}
            Err(e) => self.entity_failed(report, profile, subscription_id, &e),
        }
    }

    async fn absorb_cancels(&self, report: &mut SyncReport) -> Result<(), BillingError> {
        let subs = self
            .payments
            .list_subscriptions(SubscriptionQuery {
                customer_id: None,
                status: Some(SubscriptionStatus::Canceled),
                limit: self.config.absorb_limit,
            })
            .await?;

        for sub in &subs {
            let profile = match self.owner_of(sub).await {
                Ok(Some(profile)) => profile,
                Ok(None) => continue,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(customer_id = %sub.customer_id, error = %e, "Profile lookup failed");
                    continue;
                }
            };

            let still_live = profile.premium_record().map_or(false, |record| {
                record.stripe_subscription_id.as_deref() == Some(sub.id.as_str())
                    && (record.is_active || record.status.is_live())
            });
            if !still_live {
                continue;
            }

            match self
                .reconciler
                .apply_to_profile(&profile, sub, ProjectionDirective::Observe)
                .await
            {
                Ok(outcome) if outcome.is_written() => report.absorbed += 1,
                Ok(_) => {}
                Err(e) => self.entity_failed(report, &profile, &sub.id, &e),
            }
        }
        Ok(())
    }

    /// Profile a canceled subscription belongs to: by customer id, else by
    /// the subscription id its record carries.
    async fn owner_of(&self, sub: &Subscription) -> Result<Option<UserProfile>, StoreError> {
        if let Some(profile) = self.profiles.find_by_customer_id(&sub.customer_id).await? {
            return Ok(Some(profile));
        }
        self.profiles.find_by_subscription_id(&sub.id).await
    }

    fn entity_failed(
        &self,
        report: &mut SyncReport,
        profile: &UserProfile,
        subscription_id: &str,
        error: &BillingError,
    ) {
        report.failed += 1;
        tracing::warn!(
            user_id = %profile.id,
            subscription_id = %subscription_id,
            error = %error,
            "Sync projection failed"
        );
    }

    fn record_success(&self, report: SyncReport) -> SyncReport {
        let mut state = self.state();
        state.last_sync_time = Some(report.finished_at);
        state.sync_count += 1;
        state.consecutive_failures = 0;
        state.last_report = Some(report.clone());
        report
    }

    fn record_failure(&self, error: &BillingError) -> u32 {
        let mut state = self.state();
        state.consecutive_failures += 1;
        tracing::error!(
            error = %error,
            consecutive_failures = state.consecutive_failures,
            "Sync cycle failed"
        );
        state.consecutive_failures
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProfileStore;
    use crate::adapters::stripe::{active_subscription, MockPaymentProvider};
    use crate::domain::foundation::UserId;
    use crate::domain::subscription::{PremiumRecord, StoredPremium};
    use crate::ports::PaymentError;

    fn setup() -> (MockPaymentProvider, Arc<InMemoryProfileStore>, SyncEngine) {
        setup_with(SyncEngineConfig::default())
    }

    fn setup_with(
        config: SyncEngineConfig,
    ) -> (MockPaymentProvider, Arc<InMemoryProfileStore>, SyncEngine) {
        let mock = MockPaymentProvider::new();
        let store = Arc::new(InMemoryProfileStore::new());
        let engine = SyncEngine::new(
            Arc::new(mock.clone()),
            store.clone(),
            Reconciler::new(store.clone()),
            config,
        );
        (mock, store, engine)
    }

    fn user() -> UserId {
        UserId::new("U1").unwrap()
    }

    fn profile_with(record: Option<PremiumRecord>) -> UserProfile {
        UserProfile {
            id: user(),
            stripe_customer_id: Some("cus_1".to_string()),
            premium: record.map(StoredPremium::Record),
        }
    }

    fn record(sub_id: &str, is_active: bool, status: SubscriptionStatus, end: Timestamp) -> PremiumRecord {
        PremiumRecord {
            is_active,
            status,
            plan_id: None,
            stripe_subscription_id: Some(sub_id.to_string()),
            stripe_customer_id: Some("cus_1".to_string()),
            current_period_start: Some(end.minus_days(30)),
            current_period_end: Some(end),
            cancel_at_period_end: false,
            canceled_at: None,
            reactivated_at: None,
            started_at: Some(end.minus_days(30)),
            updated_at: Some(Timestamp::now().minus_days(1)),
        }
    }

    fn completed(run: SyncRun) -> SyncReport {
        match run {
            SyncRun::Completed(report) => report,
            SyncRun::AlreadyRunning => panic!("sync did not run"),
        }
    }

    #[tokio::test]
    async fn drifted_profile_is_adopted() {
        let (mock, store, engine) = setup();
        let now = Timestamp::now();
        let sub = active_subscription("cus_1", "sub_a", now);
        mock.add_subscription(sub.clone());
        store.insert(profile_with(Some(record(
            "sub_a",
            false,
            SubscriptionStatus::Canceled,
            now.minus_days(1),
        ))));

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.adopted, 1);
        let premium = store.premium(&user()).unwrap();
        assert!(premium.is_active);
        assert_eq!(premium.current_period_end, sub.current_period_end);
    }

    #[tokio::test]
    async fn subscription_without_profile_is_skipped() {
        let (mock, store, engine) = setup();
        mock.add_subscription(active_subscription("cus_9", "sub_z", Timestamp::now()));

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.adopted, 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn second_cycle_writes_nothing() {
        let (mock, store, engine) = setup();
        mock.add_subscription(active_subscription("cus_1", "sub_a", Timestamp::now()));
        store.insert(profile_with(None));

        engine.run_once().await.unwrap();
        let writes = store.write_count();
        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.adopted, 0);
        assert_eq!(store.write_count(), writes);
        assert_eq!(engine.status().sync_count, 2);
    }

    #[tokio::test]
    async fn stale_record_with_unpaid_subscription_expires() {
        let (mock, store, engine) = setup();
        let now = Timestamp::now();
        let mut sub = active_subscription("cus_1", "sub_a", now.minus_days(31));
        sub.status = SubscriptionStatus::Unpaid;
        mock.add_subscription(sub);
        store.insert(profile_with(Some(record(
            "sub_a",
            true,
            SubscriptionStatus::Active,
            now.minus_days(1),
        ))));

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.expired, 1);
        let premium = store.premium(&user()).unwrap();
        assert!(!premium.is_active);
        assert_eq!(premium.status, SubscriptionStatus::Unpaid);
    }

    #[tokio::test]
    async fn vanished_subscription_is_canceled_locally() {
        let (_mock, store, engine) = setup();
        store.insert(profile_with(Some(record(
            "sub_gone",
            true,
            SubscriptionStatus::Active,
            Timestamp::now().minus_days(2),
        ))));

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.expired, 1);
        let premium = store.premium(&user()).unwrap();
        assert!(!premium.is_active);
        assert_eq!(premium.status, SubscriptionStatus::Canceled);
        assert_eq!(premium.stripe_subscription_id.as_deref(), Some("sub_gone"));
    }

    #[tokio::test]
    async fn lapsed_records_beyond_one_page_all_expire() {
        let (_mock, store, engine) = setup_with(SyncEngineConfig {
            scan_page_size: 2,
            ..SyncEngineConfig::default()
        });
        let ended = Timestamp::now().minus_days(2);
        for i in 0..4 {
            let mut quiet = UserProfile::minimal(UserId::new(format!("A{}", i)).unwrap());
            quiet.premium = Some(StoredPremium::Record(record(
                "sub_old",
                false,
                SubscriptionStatus::Canceled,
                ended,
            )));
            store.insert(quiet);
        }
        let lapsed: Vec<UserId> = (0..5).map(|i| UserId::new(format!("Z{}", i)).unwrap()).collect();
        for (i, id) in lapsed.iter().enumerate() {
            let mut profile = UserProfile::minimal(id.clone());
            profile.premium = Some(StoredPremium::Record(record(
                &format!("sub_gone_{}", i),
                true,
                SubscriptionStatus::Active,
                ended,
            )));
            store.insert(profile);
        }

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.expired, 5);
        for id in &lapsed {
            let premium = store.premium(id).unwrap();
            assert!(!premium.is_active, "{} still active", id);
            assert_eq!(premium.status, SubscriptionStatus::Canceled);
        }
    }

    #[tokio::test]
    async fn canceled_subscription_is_absorbed_by_stored_subscription_id() {
        let (mock, store, engine) = setup();
        let now = Timestamp::now();
        let mut sub = active_subscription("cus_new", "sub_a", now);
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(now);
        mock.add_subscription(sub);
        let mut stored = record("sub_a", true, SubscriptionStatus::Active, now.add_days(10));
        stored.stripe_customer_id = Some("cus_old".to_string());
        store.insert(UserProfile {
            id: user(),
            stripe_customer_id: Some("cus_old".to_string()),
            premium: Some(StoredPremium::Record(stored)),
        });

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.absorbed, 1);
        let premium = store.premium(&user()).unwrap();
        assert!(!premium.is_active);
        assert_eq!(premium.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn canceled_subscription_is_absorbed() {
        let (mock, store, engine) = setup();
        let now = Timestamp::now();
        let mut sub = active_subscription("cus_1", "sub_a", now);
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(now);
        mock.add_subscription(sub);
        store.insert(profile_with(Some(record(
            "sub_a",
            true,
            SubscriptionStatus::Active,
            now.add_days(10),
        ))));

        let report = completed(engine.run_once().await.unwrap());

        assert_eq!(report.absorbed, 1);
        let premium = store.premium(&user()).unwrap();
        assert!(!premium.is_active);
        assert_eq!(premium.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_for_another_subscription_is_not_absorbed() {
        let (mock, store, engine) = setup();
        let now = Timestamp::now();
        let mut old = active_subscription("cus_1", "sub_old", now);
        old.status = SubscriptionStatus::Canceled;
        mock.add_subscription(old);
        mock.add_subscription(active_subscription("cus_1", "sub_new", now));
        store.insert(profile_with(None));

        engine.run_once().await.unwrap();

        let premium = store.premium(&user()).unwrap();
        assert_eq!(premium.stripe_subscription_id.as_deref(), Some("sub_new"));
        assert!(premium.is_active);
    }

    #[tokio::test]
    async fn list_failure_aborts_cycle_and_counts() {
        let (mock, _store, engine) = setup();
        mock.set_method_error("list_subscriptions", PaymentError::network("down"));

        assert!(engine.run_once().await.is_err());
        let status = engine.status();
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.sync_count, 0);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn third_failure_resets_and_retries() {
        let (mock, _store, engine) = setup();
        mock.set_method_error("list_subscriptions", PaymentError::network("down"));
        assert!(engine.run_once().await.is_err());
        assert!(engine.run_once().await.is_err());

        mock.clear_errors();
        let run = engine.run_once().await;

        // The third attempt hit no error, so it completes normally.
        assert!(matches!(run, Ok(SyncRun::Completed(_))));
        assert_eq!(engine.status().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn recovery_runs_fresh_cycle_after_third_failure() {
        let (mock, _store, engine) = setup();
        mock.set_method_error("list_subscriptions", PaymentError::network("down"));
        for _ in 0..2 {
            assert!(engine.run_once().await.is_err());
        }

        // Still failing: the recovery cycle fails too and starts a new count.
        assert!(engine.run_once().await.is_err());
        assert_eq!(engine.status().consecutive_failures, 1);
        assert_eq!(mock.call_count("list_subscriptions"), 4);
    }

    #[tokio::test]
    async fn concurrent_run_is_dropped() {
        let (_mock, _store, engine) = setup();
        engine.running.store(true, Ordering::Release);

        assert_eq!(engine.run_once().await.unwrap(), SyncRun::AlreadyRunning);
        assert!(engine.status().running);
    }

    #[test]
    fn status_serializes_camel_case() {
        let (_mock, _store, engine) = setup();
        let json = serde_json::to_value(engine.status()).unwrap();
        assert_eq!(json["intervalMinutes"], 60);
        assert_eq!(json["syncCount"], 0);
        assert!(json["lastSyncTime"].is_null());
        assert_eq!(json["running"], false);
    }
}
