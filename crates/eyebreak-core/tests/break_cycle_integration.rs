//! End-to-end break cycles against the deterministic timer backend.
//!
//! Covers install, fire, engage, complete/skip/snooze and process restarts
//! with the SQLite store, checking the persisted layout after every step.

use std::sync::Arc;
use std::time::Duration;

use eyebreak_core::notify::{NotificationAction, RecordingNotifier};
use eyebreak_core::scheduler::{FireOutcome, RecoveryPlan, SchedulerCore};
use eyebreak_core::session::SessionMachine;
use eyebreak_core::storage::{
    keys, load_record, patch, BreakPhase, BreakSession, Config, KeyValueStore, ProgressState,
    ScheduleState, SqliteStore,
};
use eyebreak_core::timer::{AlarmFired, AlarmName, Clock, ManualClock, ManualTimers};
use eyebreak_core::worker::{BackgroundWorker, InstallReason, WorkerHandle};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use serde_json::json;
use tokio::sync::mpsc;

const START: u64 = 1_760_000_000_000;
const MINUTE_MS: u64 = 60_000;

// ============================================================================
// Test Helpers
// ============================================================================

struct App {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<ManualClock>,
    timers: Arc<ManualTimers>,
    notifier: Arc<RecordingNotifier>,
    worker: BackgroundWorker,
    _handle: WorkerHandle,
}

impl App {
    /// Boot a fresh process around `store`. Timers never survive a boot.
    fn boot(store: Arc<dyn KeyValueStore>, now_ms: u64, config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(now_ms));
        let timers = Arc::new(ManualTimers::new(clock.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = Arc::new(SchedulerCore::new(
            store.clone(),
            timers.clone(),
            clock.clone(),
            config.scheduler.clone(),
        ));
        let session = Arc::new(SessionMachine::with_rng(
            scheduler,
            notifier.clone(),
            &config,
            Pcg64Mcg::seed_from_u64(2024),
        ));
        let (_tx, alarms) = mpsc::unbounded_channel();
        let (worker, handle) = BackgroundWorker::new(session, alarms);
        Self {
            store,
            clock,
            timers,
            notifier,
            worker,
            _handle: handle,
        }
    }

    fn session(&self) -> &SessionMachine {
        self.worker.session()
    }

    async fn schedule(&self) -> ScheduleState {
        load_record::<ScheduleState>(self.store.as_ref()).await.unwrap()
    }

    async fn break_session(&self) -> BreakSession {
        load_record::<BreakSession>(self.store.as_ref()).await.unwrap()
    }

    async fn progress(&self) -> ProgressState {
        load_record::<ProgressState>(self.store.as_ref()).await.unwrap()
    }

    /// Advance to the pending alarm and deliver it.
    async fn fire_next(&self) -> FireOutcome {
        let pending = self.timers.pending();
        assert_eq!(pending.len(), 1, "expected exactly one pending alarm");
        self.clock.set(pending[0].scheduled_time_ms);
        let due = self.timers.take_due();
        self.session()
            .on_alarm_fired(AlarmFired {
                name: due[0].name,
                scheduled_time_ms: due[0].scheduled_time_ms,
            })
            .await
            .unwrap()
    }
}

fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(eyebreak_core::storage::MemoryStore::new())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn one_minute_interval_fires_into_notified_break() {
    let store = memory_store();
    store
        .set(patch([(keys::INTERVAL_MINUTES, json!(1))]))
        .await
        .unwrap();
    let app = App::boot(store, START, Config::default());
    app.worker.on_installed(InstallReason::Install).await.unwrap();

    assert_eq!(app.timers.pending()[0].scheduled_time_ms, START + MINUTE_MS);
    assert_eq!(app.schedule().await.next_alarm_fire_time, Some(START + MINUTE_MS));

    let outcome = app.fire_next().await;
    assert!(matches!(outcome, FireOutcome::BreakStarted(_)));

    let session = app.break_session().await;
    assert!(session.is_break_active);
    assert_eq!(session.break_phase, Some(BreakPhase::Notified));
    assert_eq!(app.schedule().await.next_alarm_fire_time, None);
    assert!(app.timers.pending().is_empty());
    assert_eq!(app.notifier.shown().len(), 1);
}

#[tokio::test]
async fn full_cycle_click_complete_and_reschedule() {
    let app = App::boot(memory_store(), START, Config::default());
    app.worker.on_installed(InstallReason::Install).await.unwrap();
    app.fire_next().await;

    app.session()
        .on_notification_action(NotificationAction::ButtonClicked { button_index: 0 })
        .await
        .unwrap();
    assert_eq!(app.break_session().await.break_phase, Some(BreakPhase::Active));
    assert_eq!(app.notifier.views_opened(), 1);

    app.clock.advance(Duration::from_secs(20));
    let report = app.session().break_complete().await.unwrap();
    assert!(report.success);

    let progress = app.progress().await;
    assert_eq!(progress.breaks_today, 1);
    assert_eq!(progress.total_breaks_completed, 1);
    assert_eq!(progress.eye_score, 100);
    assert!(!app.break_session().await.is_break_active);

    let now = app.clock.now_ms();
    assert_eq!(app.schedule().await.next_alarm_fire_time, Some(now + 20 * MINUTE_MS));
    assert_eq!(app.timers.pending().len(), 1);
}

#[tokio::test]
async fn snooze_then_fire_again_from_snooze_alarm() {
    let app = App::boot(memory_store(), START, Config::default());
    app.worker.on_installed(InstallReason::Install).await.unwrap();
    app.fire_next().await;

    app.session()
        .on_notification_action(NotificationAction::ButtonClicked { button_index: 1 })
        .await
        .unwrap();
    let schedule = app.schedule().await;
    assert!(schedule.is_snoozed);
    assert_eq!(app.timers.pending()[0].name, AlarmName::Snooze);

    let outcome = app.fire_next().await;
    assert!(matches!(outcome, FireOutcome::BreakStarted(_)));
    assert!(!app.schedule().await.is_snoozed);
}

#[tokio::test]
async fn ten_cycles_keep_one_alarm_pending() {
    let app = App::boot(memory_store(), START, Config::default());
    app.worker.on_installed(InstallReason::Install).await.unwrap();

    for round in 0..10 {
        app.fire_next().await;
        match round % 3 {
            0 => {
                app.session().break_complete().await.unwrap();
            }
            1 => {
                app.session().break_skipped().await.unwrap();
            }
            _ => {
                app.session().snooze().await.unwrap();
            }
        }
        assert_eq!(app.timers.pending().len(), 1, "round {round}");
    }
    assert_eq!(app.progress().await.total_breaks_completed, 4);
}

#[tokio::test]
async fn restart_rearms_from_persisted_fire_time() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("eyebreak.db");

    let fire_at = {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&db, "sync").unwrap());
        let app = App::boot(store, START, Config::default());
        app.worker.on_installed(InstallReason::Install).await.unwrap();
        app.schedule().await.next_alarm_fire_time.unwrap()
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&db, "sync").unwrap());
    let app = App::boot(store, START + 5 * MINUTE_MS, Config::default());
    let plan = app.worker.on_startup().await.unwrap();
    assert_eq!(
        plan,
        RecoveryPlan::Rearm {
            alarm: AlarmName::Primary,
            delay_ms: fire_at - (START + 5 * MINUTE_MS)
        }
    );
    assert_eq!(app.timers.pending()[0].scheduled_time_ms, fire_at);

    // A second recovery in the same process changes nothing.
    let before = app.schedule().await;
    app.worker.on_startup().await.unwrap();
    assert_eq!(app.schedule().await, before);
    assert_eq!(app.timers.pending().len(), 1);
}

#[tokio::test]
async fn restart_during_break_stays_dormant() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("eyebreak.db");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&db, "sync").unwrap());
        let app = App::boot(store, START, Config::default());
        app.worker.on_installed(InstallReason::Install).await.unwrap();
        app.fire_next().await;
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&db, "sync").unwrap());
    let app = App::boot(store, START + 30 * MINUTE_MS, Config::default());
    let plan = app.worker.on_startup().await.unwrap();
    assert!(matches!(plan, RecoveryPlan::Dormant { .. }));
    assert!(app.timers.pending().is_empty());

    app.session().break_complete().await.unwrap();
    assert_eq!(app.timers.pending().len(), 1);
}

#[tokio::test]
async fn update_preserves_progress_and_settings() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("eyebreak.db");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&db, "sync").unwrap());
        let app = App::boot(store, START, Config::default());
        app.worker.on_installed(InstallReason::Install).await.unwrap();
        app.store
            .set(patch([(keys::INTERVAL_MINUTES, json!(35))]))
            .await
            .unwrap();
        app.fire_next().await;
        app.session().break_complete().await.unwrap();
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&db, "sync").unwrap());
    let app = App::boot(store, START + 90 * MINUTE_MS, Config::default());
    app.worker.on_installed(InstallReason::Update).await.unwrap();

    let all = app.store.get_all().await.unwrap();
    assert_eq!(all[keys::INTERVAL_MINUTES], json!(35));
    assert_eq!(all[keys::TOTAL_BREAKS_COMPLETED], json!(1));
}
