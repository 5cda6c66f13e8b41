//! Break session state machine.
//!
//! `Idle -> Notified -> (Active | Skipped | Snoozed) -> Idle`. A fired alarm
//! moves to `Notified` and shows the prompt; the user's reaction (or a
//! request from the presentation layer) closes the break and hands control
//! back to the scheduler.

pub mod progress;

pub use progress::{
    apply_completion, apply_skip, level_threshold, pick_message, roll_xp, Completion,
    BREAK_TITLES, ENCOURAGEMENTS, LEVEL_XP_STEP,
};

use std::sync::{Arc, Mutex, PoisonError};

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};
use crate::events::Event;
use crate::notify::{
    BreakIntent, Notification, NotificationAction, Notifier, BREAK_NOTIFICATION_ID,
    TEST_NOTIFICATION_ID,
};
use crate::scheduler::{FireOutcome, FollowUp, SchedulerCore};
use crate::storage::{load_record, BreakSession, Config, ProgressState, RewardsConfig, SkipConfig, StoreRecord};
use crate::timer::{local_date, AlarmFired};

/// Reply to a completed break.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub success: bool,
    pub achievement: Option<String>,
    pub xp_gain: u32,
    pub leveled_up: bool,
}

/// Reply to a snooze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeReport {
    pub success: bool,
    pub snooze_minutes: u32,
}

pub struct SessionMachine {
    scheduler: Arc<SchedulerCore>,
    notifier: Arc<dyn Notifier>,
    rewards: RewardsConfig,
    skip: SkipConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl SessionMachine {
    pub fn new(scheduler: Arc<SchedulerCore>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self::with_rng(scheduler, notifier, config, Pcg64Mcg::from_entropy())
    }

    /// Use a caller-supplied generator, e.g. a seeded one for reproducible runs.
    pub fn with_rng(
        scheduler: Arc<SchedulerCore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
        rng: impl RngCore + Send + 'static,
    ) -> Self {
        Self {
            scheduler,
            notifier,
            rewards: config.rewards.clone(),
            skip: config.skip.clone(),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn scheduler(&self) -> &Arc<SchedulerCore> {
        &self.scheduler
    }

    fn with_rng_locked<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **rng)
    }

    /// Idle -> Notified.
    pub async fn on_alarm_fired(&self, fired: AlarmFired) -> Result<FireOutcome> {
        let outcome = self.scheduler.begin_break(fired).await?;
        if let FireOutcome::BreakStarted(session) = &outcome {
            let settings = self.scheduler.settings().await;
            let title = self.with_rng_locked(|rng| pick_message(BREAK_TITLES, rng));
            let notification = Notification {
                id: BREAK_NOTIFICATION_ID.into(),
                title: title.into(),
                message: format!(
                    "Click to start your {}-second break",
                    session.break_duration_seconds
                ),
                actions: vec![
                    "Start break".into(),
                    format!("Snooze {} min", settings.snooze_minutes),
                ],
                require_interaction: true,
            };
            if let Err(e) = self.notifier.show(&notification).await {
                tracing::warn!(error = %e, "failed to show break notification");
            }
        }
        Ok(outcome)
    }

    pub async fn on_notification_action(&self, action: NotificationAction) -> Result<()> {
        match action.intent() {
            Some(BreakIntent::Start) => {
                self.notifier.clear(BREAK_NOTIFICATION_ID).await;
                if self.scheduler.engage_break().await? {
                    self.notifier.open_break_view().await;
                } else {
                    tracing::debug!("notification clicked with no break active");
                }
            }
            Some(BreakIntent::Snooze) => {
                self.notifier.clear(BREAK_NOTIFICATION_ID).await;
                self.snooze().await?;
            }
            None => tracing::debug!(?action, "unmapped notification action"),
        }
        Ok(())
    }

    /// Notified/Active -> Idle with rewards.
    pub async fn break_complete(&self) -> Result<CompletionReport> {
        let store = self.scheduler.store();
        let session = load_record::<BreakSession>(store.as_ref()).await?;
        if !session.is_break_active {
            tracing::debug!("break completion without an active break");
            return Ok(CompletionReport::default());
        }

        let progress = load_record::<ProgressState>(store.as_ref()).await?;
        let now = self.scheduler.now_ms();
        let today = local_date(now);
        let done = self.with_rng_locked(|rng| apply_completion(progress, &today, &self.rewards, rng));

        let interval = self.scheduler.settings().await.interval();
        self.scheduler
            .end_break(FollowUp::Primary(interval), done.progress.to_map())
            .await?;

        tracing::info!(
            xp_gain = done.xp_gain,
            leveled_up = done.leveled_up,
            breaks_today = done.progress.breaks_today,
            "break completed"
        );
        self.scheduler.emit(Event::BreakCompleted {
            xp_gain: done.xp_gain,
            leveled_up: done.leveled_up,
            eye_score: done.progress.eye_score,
            at_ms: now,
        });

        Ok(CompletionReport {
            success: true,
            achievement: Some(done.achievement),
            xp_gain: done.xp_gain,
            leveled_up: done.leveled_up,
        })
    }

    /// Close the break without rewards. The skip policy only applies when
    /// a break was actually running.
    pub async fn break_skipped(&self) -> Result<bool> {
        let store = self.scheduler.store();
        let session = load_record::<BreakSession>(store.as_ref()).await?;
        let progress = load_record::<ProgressState>(store.as_ref()).await?;
        let interval = self.scheduler.settings().await.interval();

        let (progress, delay) = if session.is_break_active {
            apply_skip(progress, interval, &self.skip)
        } else {
            (progress, interval)
        };

        self.notifier.clear(BREAK_NOTIFICATION_ID).await;
        self.scheduler
            .end_break(FollowUp::Primary(delay), progress.to_map())
            .await?;

        tracing::info!(policy = ?self.skip.policy, eye_score = progress.eye_score, "break skipped");
        self.scheduler.emit(Event::BreakSkipped {
            eye_score: progress.eye_score,
            mood: progress.pet_mood,
            at_ms: self.scheduler.now_ms(),
        });
        Ok(true)
    }

    /// Close any break and re-prompt after the snooze delay. Refused while
    /// breaks are disabled.
    pub async fn snooze(&self) -> Result<SnoozeReport> {
        let settings = self.scheduler.settings().await;
        if !settings.enabled {
            return Ok(SnoozeReport {
                success: false,
                snooze_minutes: settings.snooze_minutes,
            });
        }

        self.scheduler
            .end_break(
                FollowUp::Snooze {
                    minutes: settings.snooze_minutes,
                },
                Default::default(),
            )
            .await?;

        tracing::info!(minutes = settings.snooze_minutes, "break snoozed");
        self.scheduler.emit(Event::BreakSnoozed {
            minutes: settings.snooze_minutes,
            at_ms: self.scheduler.now_ms(),
        });
        Ok(SnoozeReport {
            success: true,
            snooze_minutes: settings.snooze_minutes,
        })
    }

    /// Show a throwaway notification so the user can check permissions.
    pub async fn test_notification(&self) -> std::result::Result<(), NotifyError> {
        let notification = Notification {
            id: TEST_NOTIFICATION_ID.into(),
            title: "Test Notification 🧪".into(),
            message: "If you see this, notifications work!".into(),
            actions: Vec::new(),
            require_interaction: true,
        };
        self.notifier.show(&notification).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::storage::{keys, patch, KeyValueStore, MemoryStore, PetMood, SkipPolicy};
    use crate::timer::{AlarmName, Clock, ManualClock, ManualTimers};

    const START: u64 = 1_700_000_000_000;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        timers: Arc<ManualTimers>,
        notifier: Arc<RecordingNotifier>,
        session: SessionMachine,
    }

    async fn fixture_with(config: Config) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START));
        let timers = Arc::new(ManualTimers::new(Arc::clone(&clock)));
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = Arc::new(SchedulerCore::new(
            store.clone(),
            timers.clone(),
            clock.clone(),
            config.scheduler.clone(),
        ));
        scheduler.load_settings().await.unwrap();
        let session = SessionMachine::with_rng(
            scheduler,
            notifier.clone(),
            &config,
            Pcg64Mcg::seed_from_u64(42),
        );
        Fixture {
            store,
            clock,
            timers,
            notifier,
            session,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Config::default()).await
    }

    async fn fire(f: &Fixture) {
        f.session
            .scheduler()
            .schedule_in(Duration::from_secs(60))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(60));
        let due = f.timers.take_due();
        let outcome = f
            .session
            .on_alarm_fired(AlarmFired {
                name: due[0].name,
                scheduled_time_ms: due[0].scheduled_time_ms,
            })
            .await
            .unwrap();
        assert!(matches!(outcome, FireOutcome::BreakStarted(_)));
    }

    async fn progress(f: &Fixture) -> ProgressState {
        load_record::<ProgressState>(&*f.store).await.unwrap()
    }

    #[tokio::test]
    async fn fire_shows_prompt_with_snooze_label() {
        let f = fixture().await;
        fire(&f).await;
        let shown = f.notifier.shown();
        assert_eq!(shown.len(), 1);
        assert!(BREAK_TITLES.contains(&shown[0].title.as_str()));
        assert_eq!(shown[0].message, "Click to start your 20-second break");
        assert_eq!(shown[0].actions, vec!["Start break", "Snooze 5 min"]);
    }

    #[tokio::test]
    async fn notification_failure_does_not_abort_break() {
        let f = fixture().await;
        f.notifier.fail_with(NotifyError::Disabled);
        fire(&f).await;
        let session = load_record::<BreakSession>(&*f.store).await.unwrap();
        assert!(session.is_break_active);
    }

    #[tokio::test]
    async fn click_engages_break_and_opens_view() {
        let f = fixture().await;
        fire(&f).await;
        f.clock.advance(Duration::from_secs(30));
        f.session
            .on_notification_action(NotificationAction::Clicked)
            .await
            .unwrap();

        let session = load_record::<BreakSession>(&*f.store).await.unwrap();
        assert_eq!(session.break_phase, Some(crate::storage::BreakPhase::Active));
        assert_eq!(session.break_start_time, Some(START + 90_000));
        assert_eq!(f.notifier.views_opened(), 1);
        assert_eq!(f.notifier.cleared(), vec![BREAK_NOTIFICATION_ID.to_string()]);
    }

    #[tokio::test]
    async fn snooze_button_arms_snooze_alarm() {
        let f = fixture().await;
        fire(&f).await;
        f.session
            .on_notification_action(NotificationAction::ButtonClicked { button_index: 1 })
            .await
            .unwrap();

        let pending = f.timers.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, AlarmName::Snooze);
        let session = load_record::<BreakSession>(&*f.store).await.unwrap();
        assert!(!session.is_break_active);
    }

    #[tokio::test]
    async fn completion_rewards_and_reschedules() {
        let f = fixture().await;
        f.store
            .set(patch([(keys::EYE_SCORE, json!(99))]))
            .await
            .unwrap();
        fire(&f).await;

        let report = f.session.break_complete().await.unwrap();
        assert!(report.success);
        assert!((10..=24).contains(&report.xp_gain));

        let progress = progress(&f).await;
        assert_eq!(progress.eye_score, 100);
        assert_eq!(progress.breaks_today, 1);
        assert_eq!(progress.total_breaks_completed, 1);
        assert_eq!(progress.pet_xp, report.xp_gain);
        assert_eq!(progress.latest_achievement, report.achievement);

        let pending = f.timers.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].scheduled_time_ms, f.clock.now_ms() + 20 * 60_000);
    }

    #[tokio::test]
    async fn completion_without_break_is_refused() {
        let f = fixture().await;
        let report = f.session.break_complete().await.unwrap();
        assert!(!report.success);
        assert_eq!(progress(&f).await, ProgressState::default());
    }

    #[tokio::test]
    async fn lenient_skip_keeps_score() {
        let f = fixture().await;
        fire(&f).await;
        assert!(f.session.break_skipped().await.unwrap());
        let progress = progress(&f).await;
        assert_eq!(progress.eye_score, 100);
        assert_eq!(progress.pet_mood, PetMood::Happy);
        assert_eq!(
            f.timers.pending()[0].scheduled_time_ms,
            f.clock.now_ms() + 20 * 60_000
        );
    }

    #[tokio::test]
    async fn penalizing_skip_lowers_score_and_stretches_interval() {
        let mut config = Config::default();
        config.skip.policy = SkipPolicy::Penalize;
        let f = fixture_with(config).await;
        fire(&f).await;
        f.session.break_skipped().await.unwrap();

        let progress = progress(&f).await;
        assert_eq!(progress.eye_score, 97);
        assert_eq!(progress.pet_mood, PetMood::Sleepy);
        assert_eq!(
            f.timers.pending()[0].scheduled_time_ms,
            f.clock.now_ms() + 30 * 60_000
        );
    }

    #[tokio::test]
    async fn snooze_refused_while_disabled() {
        let f = fixture().await;
        f.session
            .scheduler()
            .apply_settings(crate::storage::Settings {
                enabled: false,
                ..Default::default()
            })
            .await
            .unwrap();
        let report = f.session.snooze().await.unwrap();
        assert!(!report.success);
        assert!(f.timers.pending().is_empty());
    }

    #[tokio::test]
    async fn test_notification_surfaces_error() {
        let f = fixture().await;
        assert!(f.session.test_notification().await.is_ok());
        f.notifier
            .fail_with(NotifyError::Rejected("permission denied".into()));
        let err = f.session.test_notification().await.unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }
}
