//! Reconciliation between the timer platform and the persisted schedule.
//!
//! Both startup recovery and the fire handler decide what is authoritative
//! through the pure functions here, so the two paths cannot disagree.

use serde::{Deserialize, Serialize};

use crate::storage::StoreSnapshot;
use crate::timer::{AlarmFired, AlarmInfo, AlarmName, TimerPrimitive};

/// Why no alarm should be pending right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DormantReason {
    Disabled,
    BreakActive,
    Paused,
    /// A newer alarm replaced the one that fired.
    Superseded,
}

/// Pending alarms as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub primary: Option<AlarmInfo>,
    pub snooze: Option<AlarmInfo>,
}

impl TimerSnapshot {
    pub async fn capture(timers: &dyn TimerPrimitive) -> Self {
        Self {
            primary: timers.get(AlarmName::Primary).await,
            snooze: timers.get(AlarmName::Snooze).await,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = AlarmInfo> + '_ {
        self.primary.iter().chain(self.snooze.iter()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.snooze.is_none()
    }

    /// Earliest pending alarm.
    pub fn earliest(&self) -> Option<AlarmInfo> {
        self.pending().min_by_key(|info| info.scheduled_time_ms)
    }
}

/// What startup recovery should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RecoveryPlan {
    /// Nothing may be pending.
    Dormant { reason: DormantReason },
    /// A timer survived; mirror its fire time into the store.
    Adopt { alarm: AlarmName, fire_at_ms: u64 },
    /// Timer lost but the persisted fire time is still ahead; re-arm for the
    /// remaining delay.
    Rearm { alarm: AlarmName, delay_ms: u64 },
    /// No usable signal; start a full interval.
    Fresh { delay_ms: u64 },
}

/// Whether the schedule should currently be dormant.
pub fn gate(store: &StoreSnapshot) -> Option<DormantReason> {
    if !store.settings.enabled {
        Some(DormantReason::Disabled)
    } else if store.session.is_break_active {
        Some(DormantReason::BreakActive)
    } else if store.schedule.is_paused {
        Some(DormantReason::Paused)
    } else {
        None
    }
}

/// The fire time everything else should agree with: a pending timer wins
/// over the persisted mirror.
pub fn authoritative_fire_time(timers: &TimerSnapshot, store: &StoreSnapshot) -> Option<AlarmInfo> {
    timers.earliest().or_else(|| {
        store.schedule.next_alarm_fire_time.map(|fire_at| AlarmInfo {
            name: if store.schedule.is_snoozed {
                AlarmName::Snooze
            } else {
                AlarmName::Primary
            },
            scheduled_time_ms: fire_at,
        })
    })
}

pub fn reconcile(timers: &TimerSnapshot, store: &StoreSnapshot, now_ms: u64) -> RecoveryPlan {
    if let Some(reason) = gate(store) {
        return RecoveryPlan::Dormant { reason };
    }

    if let Some(info) = timers.earliest() {
        return RecoveryPlan::Adopt {
            alarm: info.name,
            fire_at_ms: info.scheduled_time_ms,
        };
    }

    match authoritative_fire_time(timers, store) {
        Some(info) if info.scheduled_time_ms > now_ms => RecoveryPlan::Rearm {
            alarm: info.name,
            delay_ms: info.scheduled_time_ms - now_ms,
        },
        _ => RecoveryPlan::Fresh {
            delay_ms: store.settings.interval_ms(),
        },
    }
}

/// Decide whether a fired alarm should start a break. `timers` is captured
/// after the fire, so the fired alarm itself is no longer pending.
pub fn admit_fire(
    fired: &AlarmFired,
    timers: &TimerSnapshot,
    store: &StoreSnapshot,
    now_ms: u64,
) -> Result<(), DormantReason> {
    if let Some(reason) = gate(store) {
        return Err(reason);
    }
    match authoritative_fire_time(timers, store) {
        Some(current)
            if current.scheduled_time_ms > now_ms
                && current.scheduled_time_ms != fired.scheduled_time_ms =>
        {
            Err(DormantReason::Superseded)
        }
        _ => Ok(()),
    }
}
