//! Scheduler core.
//!
//! Owns the alarm lifecycle: scheduling, pause/resume, snooze, settings
//! changes and startup recovery. Every sequence that mutates schedule state
//! runs under one async mutex, writes intent flags before clearing timers,
//! and clears before it creates.
//!
//! ## States
//!
//! ```text
//! Disabled <-> Running <-> Paused
//!                 |
//!                 v (timer fires)
//!              InBreak -> Running
//! ```

mod reconcile;

pub use reconcile::{
    admit_fire, authoritative_fire_time, gate, reconcile, DormantReason, RecoveryPlan,
    TimerSnapshot,
};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::Result;
use crate::events::Event;
use crate::storage::{
    keys, patch, BreakPhase, BreakSession, KeyValueStore, SchedulerConfig, Settings,
    StoreChanges, StoreMap, StoreRecord, StoreSnapshot,
};
use crate::timer::{AlarmFired, AlarmInfo, AlarmName, Clock, TimerPrimitive};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Answer to "how long until the next break".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRemaining {
    pub time_remaining_ms: u64,
    pub is_snoozed: bool,
    pub is_paused: bool,
}

/// How the schedule continues once a break ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Primary(Duration),
    Snooze { minutes: u32 },
}

/// Outcome of a fired alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    BreakStarted(BreakSession),
    Ignored(DormantReason),
}

pub struct SchedulerCore {
    store: Arc<dyn KeyValueStore>,
    timers: Arc<dyn TimerPrimitive>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    settings: RwLock<Settings>,
    ops: Mutex<()>,
    events_tx: broadcast::Sender<Event>,
}

impl SchedulerCore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        timers: Arc<dyn TimerPrimitive>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            timers,
            clock,
            config,
            settings: RwLock::new(Settings::default()),
            ops: Mutex::new(()),
            events_tx,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn min_delay(&self) -> Duration {
        self.config.min_delay()
    }

    /// Cached settings.
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        tracing::debug!(?event, "scheduler event");
        let _ = self.events_tx.send(event);
    }

    pub async fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot::load(self.store.as_ref()).await?)
    }

    pub async fn timer_snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::capture(self.timers.as_ref()).await
    }

    pub async fn time_remaining(&self) -> Result<TimeRemaining> {
        let snapshot = self.snapshot().await?;
        let timers = self.timer_snapshot().await;
        let now = self.now_ms();
        let full = snapshot.settings.interval_ms();
        let schedule = &snapshot.schedule;

        let time_remaining_ms = if schedule.is_paused || !snapshot.settings.enabled {
            schedule.paused_remaining_ms.unwrap_or(full)
        } else {
            authoritative_fire_time(&timers, &snapshot)
                .map(|info| info.scheduled_time_ms.saturating_sub(now))
                .unwrap_or(full)
        };

        Ok(TimeRemaining {
            time_remaining_ms,
            is_snoozed: schedule.is_snoozed,
            is_paused: schedule.is_paused,
        })
    }

    // ── Settings cache ───────────────────────────────────────────────

    /// Replace the cache with what the store holds.
    pub async fn load_settings(&self) -> Result<Settings> {
        let settings = crate::storage::load_record::<Settings>(self.store.as_ref()).await?;
        *self.settings.write().await = settings.clone();
        Ok(settings)
    }

    /// Fold a store change batch into the cache. Returns the previous and
    /// new settings when a settings key actually changed.
    pub async fn refresh_settings(&self, changes: &StoreChanges) -> Option<(Settings, Settings)> {
        if !Settings::KEYS.iter().any(|key| changes.contains_key(*key)) {
            return None;
        }
        let mut cache = self.settings.write().await;
        let mut map = cache.to_map();
        for key in Settings::KEYS {
            if let Some(change) = changes.get(*key) {
                match &change.new_value {
                    Some(value) => {
                        map.insert(key.to_string(), value.clone());
                    }
                    None => {
                        map.remove(*key);
                    }
                }
            }
        }
        let updated = Settings::from_map(&map);
        if updated == *cache {
            return None;
        }
        let previous = std::mem::replace(&mut *cache, updated.clone());
        Some((previous, updated))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace any pending alarm with a primary alarm `delay` from now.
    pub async fn schedule_in(&self, delay: Duration) -> Result<Option<AlarmInfo>> {
        let _guard = self.ops.lock().await;
        self.arm_locked(AlarmName::Primary, delay).await
    }

    /// Replace any pending alarm with a snooze alarm.
    pub async fn schedule_snooze(&self, minutes: u32) -> Result<Option<AlarmInfo>> {
        let _guard = self.ops.lock().await;
        self.arm_locked(AlarmName::Snooze, snooze_delay(minutes)).await
    }

    /// Freeze the countdown. Returns the remaining time that `resume` will
    /// continue from.
    pub async fn pause(&self) -> Result<u64> {
        let _guard = self.ops.lock().await;
        let snapshot = self.snapshot().await?;
        let full = snapshot.settings.interval_ms();

        if snapshot.schedule.is_paused {
            return Ok(snapshot.schedule.paused_remaining_ms.unwrap_or(full));
        }
        // Nothing is counting down while disabled.
        if !snapshot.settings.enabled {
            return Ok(snapshot.schedule.paused_remaining_ms.unwrap_or(full));
        }

        let now = self.now_ms();
        let timers = self.timer_snapshot().await;
        let remaining = authoritative_fire_time(&timers, &snapshot)
            .map(|info| info.scheduled_time_ms.saturating_sub(now))
            .unwrap_or(full);

        // Intent first: an observer must never see "running, no fire time".
        self.store
            .set(patch([
                (keys::IS_PAUSED, json!(true)),
                (keys::PAUSED_REMAINING_MS, json!(remaining)),
                (keys::NEXT_ALARM_FIRE_TIME, Value::Null),
            ]))
            .await?;
        self.clear_all_timers().await;

        tracing::info!(remaining_ms = remaining, "timer paused");
        self.emit(Event::TimerPaused {
            remaining_ms: remaining,
            at_ms: now,
        });
        Ok(remaining)
    }

    pub async fn resume(&self) -> Result<Option<AlarmInfo>> {
        let _guard = self.ops.lock().await;
        let snapshot = self.snapshot().await?;
        let schedule = &snapshot.schedule;

        if !schedule.is_paused {
            return Ok(self.timer_snapshot().await.earliest());
        }

        let delay_ms = schedule
            .paused_remaining_ms
            .filter(|ms| *ms > 0)
            .unwrap_or_else(|| snapshot.settings.interval_ms());

        if !snapshot.settings.enabled || snapshot.session.is_break_active {
            self.store
                .set(patch([
                    (keys::IS_PAUSED, json!(false)),
                    (keys::PAUSED_REMAINING_MS, Value::Null),
                ]))
                .await?;
            return Ok(None);
        }

        let alarm = if schedule.is_snoozed {
            AlarmName::Snooze
        } else {
            AlarmName::Primary
        };
        self.emit(Event::TimerResumed {
            remaining_ms: delay_ms,
            at_ms: self.now_ms(),
        });
        self.arm_locked(alarm, Duration::from_millis(delay_ms)).await
    }

    /// Restart the countdown from the full interval.
    pub async fn reset(&self) -> Result<Option<AlarmInfo>> {
        let _guard = self.ops.lock().await;
        let snapshot = self.snapshot().await?;
        let full = snapshot.settings.interval_ms();
        self.emit(Event::TimerReset { at_ms: self.now_ms() });

        if !snapshot.settings.enabled {
            self.store
                .set(patch([(keys::PAUSED_REMAINING_MS, json!(full))]))
                .await?;
            return Ok(None);
        }
        if snapshot.session.is_break_active {
            if snapshot.schedule.is_paused {
                self.store
                    .set(patch([(keys::PAUSED_REMAINING_MS, json!(full))]))
                    .await?;
            }
            return Ok(None);
        }
        // Arming also lifts a pause.
        self.arm_locked(AlarmName::Primary, snapshot.settings.interval())
            .await
    }

    /// Persist new settings and bring the schedule in line with them.
    pub async fn apply_settings(&self, settings: Settings) -> Result<()> {
        let settings = settings.normalized();
        let _guard = self.ops.lock().await;
        let previous = {
            let mut cache = self.settings.write().await;
            std::mem::replace(&mut *cache, settings.clone())
        };
        self.store.set(settings.to_map()).await?;
        self.reconcile_settings_locked(&previous, &settings).await
    }

    /// React to settings that changed in the store behind our back.
    pub async fn on_settings_changed(&self, previous: &Settings, current: &Settings) -> Result<()> {
        let _guard = self.ops.lock().await;
        self.reconcile_settings_locked(previous, current).await
    }

    /// Bring the alarm back after a process restart.
    pub async fn recover_on_startup(&self) -> Result<RecoveryPlan> {
        let _guard = self.ops.lock().await;
        let settings = self.load_settings().await?;
        let snapshot = self.snapshot().await?;
        let timers = self.timer_snapshot().await;
        let now = self.now_ms();
        let plan = reconcile(&timers, &snapshot, now);

        tracing::info!(?plan, enabled = settings.enabled, "startup recovery");
        match plan {
            RecoveryPlan::Dormant { .. } => {
                // A kill between a pause's intent write and its clear can
                // leave an alarm behind.
                self.clear_all_timers().await;
            }
            RecoveryPlan::Adopt { alarm, fire_at_ms } => {
                for other in AlarmName::ALL.into_iter().filter(|a| *a != alarm) {
                    self.timers.clear(other).await;
                }
                self.store
                    .set(schedule_patch(alarm, Some(fire_at_ms)))
                    .await?;
            }
            RecoveryPlan::Rearm { alarm, delay_ms } => {
                self.arm_locked(alarm, Duration::from_millis(delay_ms)).await?;
            }
            RecoveryPlan::Fresh { delay_ms } => {
                self.arm_locked(AlarmName::Primary, Duration::from_millis(delay_ms))
                    .await?;
            }
        }
        self.emit(Event::Recovered { plan, at_ms: now });
        Ok(plan)
    }

    // ── Break lifecycle hooks (driven by the session machine) ────────

    /// Turn a fired alarm into an active break, unless reconciliation says
    /// the fire is stale.
    pub async fn begin_break(&self, fired: AlarmFired) -> Result<FireOutcome> {
        let _guard = self.ops.lock().await;
        let snapshot = self.snapshot().await?;
        let timers = self.timer_snapshot().await;
        let now = self.now_ms();

        if let Err(reason) = admit_fire(&fired, &timers, &snapshot, now) {
            tracing::info!(alarm = %fired.name, ?reason, "ignoring alarm");
            self.emit(Event::FireIgnored {
                alarm: fired.name,
                reason,
                at_ms: now,
            });
            return Ok(FireOutcome::Ignored(reason));
        }

        let session = BreakSession {
            is_break_active: true,
            break_start_time: Some(now),
            break_duration_seconds: snapshot.settings.break_duration_seconds,
            break_phase: Some(BreakPhase::Notified),
        };
        let mut items = session.to_map();
        items.insert(keys::IS_SNOOZED.into(), json!(false));
        items.insert(keys::NEXT_ALARM_FIRE_TIME.into(), Value::Null);
        self.store.set(items).await?;
        self.clear_all_timers().await;

        tracing::info!(alarm = %fired.name, "break started");
        self.emit(Event::BreakStarted {
            alarm: fired.name,
            duration_secs: session.break_duration_seconds,
            at_ms: now,
        });
        Ok(FireOutcome::BreakStarted(session))
    }

    /// Mark the running break as engaged. Returns false when no break is active.
    pub async fn engage_break(&self) -> Result<bool> {
        let _guard = self.ops.lock().await;
        let session = crate::storage::load_record::<BreakSession>(self.store.as_ref()).await?;
        if !session.is_break_active {
            return Ok(false);
        }
        let now = self.now_ms();
        self.store
            .set(patch([
                (keys::BREAK_PHASE, json!(BreakPhase::Active)),
                (keys::BREAK_START_TIME, json!(now)),
            ]))
            .await?;
        self.emit(Event::BreakEngaged { at_ms: now });
        Ok(true)
    }

    /// Close the break, write `progress` in the same batch and arm the
    /// follow-up alarm when the schedule is live.
    pub async fn end_break(&self, follow_up: FollowUp, progress: StoreMap) -> Result<Option<AlarmInfo>> {
        let _guard = self.ops.lock().await;
        let mut items = patch([
            (keys::IS_BREAK_ACTIVE, json!(false)),
            (keys::BREAK_PHASE, Value::Null),
        ]);
        items.extend(progress);
        self.store.set(items).await?;

        let snapshot = self.snapshot().await?;
        let delay = match follow_up {
            FollowUp::Primary(delay) => delay,
            FollowUp::Snooze { minutes } => snooze_delay(minutes),
        };
        match gate(&snapshot) {
            None => {
                let alarm = match follow_up {
                    FollowUp::Primary(_) => AlarmName::Primary,
                    FollowUp::Snooze { .. } => AlarmName::Snooze,
                };
                self.arm_locked(alarm, delay).await
            }
            Some(DormantReason::Paused) => {
                self.store
                    .set(patch([
                        (keys::PAUSED_REMAINING_MS, json!(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))),
                        (keys::IS_SNOOZED, json!(matches!(follow_up, FollowUp::Snooze { .. }))),
                    ]))
                    .await?;
                Ok(None)
            }
            Some(_) => Ok(None),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn clear_all_timers(&self) {
        for alarm in AlarmName::ALL {
            self.timers.clear(alarm).await;
        }
    }

    /// Clear, create, persist. Caller holds `ops`.
    async fn arm_locked(&self, alarm: AlarmName, delay: Duration) -> Result<Option<AlarmInfo>> {
        self.clear_all_timers().await;

        let delay = delay.max(self.config.min_delay());
        match self.timers.create(alarm, delay).await {
            Ok(info) => {
                self.store
                    .set(schedule_patch(alarm, Some(info.scheduled_time_ms)))
                    .await?;
                tracing::info!(
                    alarm = %alarm,
                    delay_secs = delay.as_secs(),
                    fire_at_ms = info.scheduled_time_ms,
                    "break scheduled"
                );
                self.emit(Event::BreakScheduled {
                    alarm,
                    fire_at_ms: info.scheduled_time_ms,
                    at_ms: self.now_ms(),
                });
                Ok(Some(info))
            }
            Err(e) => {
                // Not retried; the next recovery or user action reschedules.
                tracing::warn!(alarm = %alarm, error = %e, "failed to create alarm");
                self.store.set(schedule_patch(alarm, None)).await?;
                self.emit(Event::ScheduleFailed {
                    alarm,
                    message: e.to_string(),
                    at_ms: self.now_ms(),
                });
                Ok(None)
            }
        }
    }

    async fn clear_schedule_locked(&self) -> Result<()> {
        self.store
            .set(patch([
                (keys::NEXT_ALARM_FIRE_TIME, Value::Null),
                (keys::IS_PAUSED, json!(false)),
                (keys::PAUSED_REMAINING_MS, Value::Null),
                (keys::IS_SNOOZED, json!(false)),
            ]))
            .await?;
        self.clear_all_timers().await;
        tracing::info!("schedule cleared");
        self.emit(Event::ScheduleCleared { at_ms: self.now_ms() });
        Ok(())
    }

    async fn reconcile_settings_locked(&self, previous: &Settings, current: &Settings) -> Result<()> {
        if !current.enabled {
            return self.clear_schedule_locked().await;
        }

        let snapshot = self.snapshot().await?;
        if snapshot.session.is_break_active {
            return Ok(());
        }

        let interval_changed = previous.interval_minutes != current.interval_minutes;
        let just_enabled = !previous.enabled;
        if snapshot.schedule.is_paused && !just_enabled {
            if interval_changed {
                self.store
                    .set(patch([(keys::PAUSED_REMAINING_MS, json!(current.interval_ms()))]))
                    .await?;
            }
            return Ok(());
        }

        let nothing_pending = self.timer_snapshot().await.is_empty();
        if just_enabled || interval_changed || nothing_pending {
            self.arm_locked(AlarmName::Primary, current.interval()).await?;
        }
        Ok(())
    }
}

fn snooze_delay(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes.max(1)) * 60)
}

/// Schedule fields after arming `alarm` (or failing to).
fn schedule_patch(alarm: AlarmName, fire_at_ms: Option<u64>) -> StoreMap {
    patch([
        (keys::NEXT_ALARM_FIRE_TIME, json!(fire_at_ms)),
        (keys::IS_PAUSED, json!(false)),
        (keys::PAUSED_REMAINING_MS, Value::Null),
        (
            keys::IS_SNOOZED,
            json!(fire_at_ms.is_some() && alarm == AlarmName::Snooze),
        ),
    ])
}
