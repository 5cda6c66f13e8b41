//! Typed views over the flat persisted key space.
//!
//! Every record reads with documented defaults when keys are absent or
//! `null`, so callers never see an incomplete read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::kv::{KeyValueStore, StoreMap};
use crate::error::StoreError;

/// Persisted key names.
pub mod keys {
    pub const INTERVAL_MINUTES: &str = "intervalMinutes";
    pub const BREAK_DURATION_SECONDS: &str = "breakDurationSeconds";
    pub const SNOOZE_MINUTES: &str = "snoozeMinutes";
    pub const ENABLED: &str = "enabled";
    pub const SOUND_ENABLED: &str = "soundEnabled";
    pub const SELECTED_SOUND: &str = "selectedSound";

    pub const NEXT_ALARM_FIRE_TIME: &str = "nextAlarmFireTime";
    pub const IS_PAUSED: &str = "isPaused";
    pub const PAUSED_REMAINING_MS: &str = "pausedRemainingMs";
    pub const IS_SNOOZED: &str = "isSnoozed";

    pub const IS_BREAK_ACTIVE: &str = "isBreakActive";
    pub const BREAK_START_TIME: &str = "breakStartTime";
    pub const BREAK_DURATION: &str = "breakDuration";
    pub const BREAK_PHASE: &str = "breakPhase";

    pub const BREAKS_TODAY: &str = "breaksToday";
    pub const BREAKS_TODAY_DATE: &str = "breaksTodayDate";
    pub const TOTAL_BREAKS_COMPLETED: &str = "totalBreaksCompleted";
    pub const EYE_SCORE: &str = "eyeScore";
    pub const PET_LEVEL: &str = "petLevel";
    pub const PET_XP: &str = "petXP";
    pub const PET_MOOD: &str = "petMood";
    pub const ACHIEVEMENTS: &str = "achievements";
    pub const LATEST_ACHIEVEMENT: &str = "latestAchievement";
}

pub const DEFAULT_INTERVAL_MINUTES: u32 = 20;
pub const DEFAULT_BREAK_DURATION_SECONDS: u32 = 20;
pub const DEFAULT_SNOOZE_MINUTES: u32 = 5;
pub const DEFAULT_EYE_SCORE: u32 = 100;
pub const MAX_EYE_SCORE: u32 = 100;
pub const DEFAULT_SOUND: &str = "gentle-bell";

/// A group of fields persisted under flat keys.
pub trait StoreRecord: Serialize + DeserializeOwned + Default {
    const KEYS: &'static [&'static str];

    /// Clamp out-of-range persisted values.
    fn normalized(self) -> Self {
        self
    }

    /// Decode from a store read. `null` is treated as absent; a mistyped
    /// value makes the whole record fall back to defaults.
    fn from_map(map: &StoreMap) -> Self {
        let present: StoreMap = Self::KEYS
            .iter()
            .filter_map(|key| match map.get(*key) {
                Some(Value::Null) | None => None,
                Some(value) => Some((key.to_string(), value.clone())),
            })
            .collect();
        match serde_json::from_value::<Self>(Value::Object(present)) {
            Ok(record) => record.normalized(),
            Err(e) => {
                tracing::warn!(error = %e, keys = ?Self::KEYS, "unreadable record, using defaults");
                Self::default()
            }
        }
    }

    fn to_map(&self) -> StoreMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => StoreMap::new(),
        }
    }
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}
fn default_duration() -> u32 {
    DEFAULT_BREAK_DURATION_SECONDS
}
fn default_snooze() -> u32 {
    DEFAULT_SNOOZE_MINUTES
}
fn default_true() -> bool {
    true
}
fn default_sound() -> String {
    DEFAULT_SOUND.into()
}
fn default_eye_score() -> u32 {
    DEFAULT_EYE_SCORE
}
fn default_level() -> u32 {
    1
}

/// User-editable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    #[serde(default = "default_duration")]
    pub break_duration_seconds: u32,
    #[serde(default = "default_snooze")]
    pub snooze_minutes: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Consumed by the presentation layer only.
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_sound")]
    pub selected_sound: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            break_duration_seconds: DEFAULT_BREAK_DURATION_SECONDS,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            enabled: true,
            sound_enabled: true,
            selected_sound: default_sound(),
        }
    }
}

impl Settings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval().as_millis() as u64
    }
}

impl StoreRecord for Settings {
    const KEYS: &'static [&'static str] = &[
        keys::INTERVAL_MINUTES,
        keys::BREAK_DURATION_SECONDS,
        keys::SNOOZE_MINUTES,
        keys::ENABLED,
        keys::SOUND_ENABLED,
        keys::SELECTED_SOUND,
    ];

    fn normalized(mut self) -> Self {
        self.interval_minutes = self.interval_minutes.max(1);
        self.break_duration_seconds = self.break_duration_seconds.max(1);
        self.snooze_minutes = self.snooze_minutes.max(1);
        self
    }
}

/// Alarm bookkeeping mirrored into the store by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    #[serde(default)]
    pub next_alarm_fire_time: Option<u64>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub paused_remaining_ms: Option<u64>,
    #[serde(default)]
    pub is_snoozed: bool,
}

impl StoreRecord for ScheduleState {
    const KEYS: &'static [&'static str] = &[
        keys::NEXT_ALARM_FIRE_TIME,
        keys::IS_PAUSED,
        keys::PAUSED_REMAINING_MS,
        keys::IS_SNOOZED,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakPhase {
    /// Prompt shown, user has not engaged yet.
    Notified,
    /// User opened the break view and the countdown is running.
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakSession {
    #[serde(default)]
    pub is_break_active: bool,
    #[serde(default)]
    pub break_start_time: Option<u64>,
    #[serde(rename = "breakDuration", default = "default_duration")]
    pub break_duration_seconds: u32,
    #[serde(default)]
    pub break_phase: Option<BreakPhase>,
}

impl Default for BreakSession {
    fn default() -> Self {
        Self {
            is_break_active: false,
            break_start_time: None,
            break_duration_seconds: DEFAULT_BREAK_DURATION_SECONDS,
            break_phase: None,
        }
    }
}

impl StoreRecord for BreakSession {
    const KEYS: &'static [&'static str] = &[
        keys::IS_BREAK_ACTIVE,
        keys::BREAK_START_TIME,
        keys::BREAK_DURATION,
        keys::BREAK_PHASE,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetMood {
    #[default]
    Happy,
    Content,
    Sleepy,
    Ecstatic,
}

/// Gamified progress, mutated only by break outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    #[serde(default)]
    pub breaks_today: u32,
    /// Local date `breaks_today` counts.
    #[serde(default)]
    pub breaks_today_date: Option<String>,
    #[serde(default)]
    pub total_breaks_completed: u32,
    #[serde(default = "default_eye_score")]
    pub eye_score: u32,
    #[serde(default = "default_level")]
    pub pet_level: u32,
    #[serde(rename = "petXP", default)]
    pub pet_xp: u32,
    #[serde(default)]
    pub pet_mood: PetMood,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub latest_achievement: Option<String>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            breaks_today: 0,
            breaks_today_date: None,
            total_breaks_completed: 0,
            eye_score: DEFAULT_EYE_SCORE,
            pet_level: 1,
            pet_xp: 0,
            pet_mood: PetMood::Happy,
            achievements: Vec::new(),
            latest_achievement: None,
        }
    }
}

impl StoreRecord for ProgressState {
    const KEYS: &'static [&'static str] = &[
        keys::BREAKS_TODAY,
        keys::BREAKS_TODAY_DATE,
        keys::TOTAL_BREAKS_COMPLETED,
        keys::EYE_SCORE,
        keys::PET_LEVEL,
        keys::PET_XP,
        keys::PET_MOOD,
        keys::ACHIEVEMENTS,
        keys::LATEST_ACHIEVEMENT,
    ];

    fn normalized(mut self) -> Self {
        self.eye_score = self.eye_score.min(MAX_EYE_SCORE);
        self.pet_level = self.pet_level.max(1);
        self
    }
}

/// Everything the scheduler needs to decide what happens next, read in one
/// store round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub settings: Settings,
    pub schedule: ScheduleState,
    pub session: BreakSession,
}

impl StoreSnapshot {
    pub fn from_map(map: &StoreMap) -> Self {
        Self {
            settings: Settings::from_map(map),
            schedule: ScheduleState::from_map(map),
            session: BreakSession::from_map(map),
        }
    }

    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let keys: Vec<&str> = Settings::KEYS
            .iter()
            .chain(ScheduleState::KEYS)
            .chain(BreakSession::KEYS)
            .copied()
            .collect();
        let map = store.get(&keys).await?;
        Ok(Self::from_map(&map))
    }
}

/// Read a single record with defaults applied.
pub async fn load_record<R: StoreRecord>(store: &dyn KeyValueStore) -> Result<R, StoreError> {
    let map = store.get(R::KEYS).await?;
    Ok(R::from_map(&map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::patch;
    use serde_json::json;

    #[test]
    fn empty_read_yields_documented_defaults() {
        let snapshot = StoreSnapshot::from_map(&StoreMap::new());
        assert_eq!(snapshot.settings.interval_minutes, 20);
        assert_eq!(snapshot.settings.break_duration_seconds, 20);
        assert_eq!(snapshot.settings.snooze_minutes, 5);
        assert!(snapshot.settings.enabled);
        assert!(!snapshot.schedule.is_paused);
        assert!(!snapshot.session.is_break_active);

        let progress = ProgressState::from_map(&StoreMap::new());
        assert_eq!(progress.eye_score, 100);
        assert_eq!(progress.pet_level, 1);
        assert_eq!(progress.pet_mood, PetMood::Happy);
    }

    #[test]
    fn null_values_read_as_absent() {
        let map = patch([
            (keys::NEXT_ALARM_FIRE_TIME, Value::Null),
            (keys::INTERVAL_MINUTES, Value::Null),
            (keys::IS_PAUSED, json!(true)),
        ]);
        let snapshot = StoreSnapshot::from_map(&map);
        assert_eq!(snapshot.schedule.next_alarm_fire_time, None);
        assert!(snapshot.schedule.is_paused);
        assert_eq!(snapshot.settings.interval_minutes, 20);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let map = patch([
            (keys::INTERVAL_MINUTES, json!(0)),
            (keys::EYE_SCORE, json!(250)),
            (keys::PET_LEVEL, json!(0)),
        ]);
        assert_eq!(Settings::from_map(&map).interval_minutes, 1);
        let progress = ProgressState::from_map(&map);
        assert_eq!(progress.eye_score, 100);
        assert_eq!(progress.pet_level, 1);
    }

    #[test]
    fn mistyped_record_falls_back_to_defaults() {
        let map = patch([(keys::INTERVAL_MINUTES, json!("soon"))]);
        assert_eq!(Settings::from_map(&map), Settings::default());
    }

    #[test]
    fn records_write_flat_keys() {
        let progress = ProgressState {
            pet_xp: 40,
            pet_mood: PetMood::Sleepy,
            ..ProgressState::default()
        };
        let map = progress.to_map();
        assert_eq!(map[keys::PET_XP], json!(40));
        assert_eq!(map[keys::PET_MOOD], json!("sleepy"));

        let session = BreakSession {
            is_break_active: true,
            break_start_time: Some(5),
            break_duration_seconds: 30,
            break_phase: Some(BreakPhase::Notified),
        };
        let map = session.to_map();
        assert_eq!(map[keys::BREAK_DURATION], json!(30));
        assert_eq!(map[keys::BREAK_PHASE], json!("notified"));
        assert_eq!(BreakSession::from_map(&map), session);
    }
}
