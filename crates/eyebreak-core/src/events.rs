use serde::{Deserialize, Serialize};

use crate::scheduler::{DormantReason, RecoveryPlan};
use crate::storage::PetMood;
use crate::timer::AlarmName;

/// Every state change in the system produces an Event.
/// Hosts subscribe to them for logging and UI refresh; the store remains the
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    BreakScheduled {
        alarm: AlarmName,
        fire_at_ms: u64,
        at_ms: u64,
    },
    /// The timer platform refused an alarm. Recovery reschedules later.
    ScheduleFailed {
        alarm: AlarmName,
        message: String,
        at_ms: u64,
    },
    TimerPaused {
        remaining_ms: u64,
        at_ms: u64,
    },
    TimerResumed {
        remaining_ms: u64,
        at_ms: u64,
    },
    TimerReset {
        at_ms: u64,
    },
    ScheduleCleared {
        at_ms: u64,
    },
    Recovered {
        plan: RecoveryPlan,
        at_ms: u64,
    },
    /// A timer fired and the prompt is up.
    BreakStarted {
        alarm: AlarmName,
        duration_secs: u32,
        at_ms: u64,
    },
    /// The user opened the break view from the prompt.
    BreakEngaged {
        at_ms: u64,
    },
    BreakCompleted {
        xp_gain: u32,
        leveled_up: bool,
        eye_score: u32,
        at_ms: u64,
    },
    BreakSkipped {
        eye_score: u32,
        mood: PetMood,
        at_ms: u64,
    },
    BreakSnoozed {
        minutes: u32,
        at_ms: u64,
    },
    /// A timer fired while nothing should have been pending.
    FireIgnored {
        alarm: AlarmName,
        reason: DormantReason,
        at_ms: u64,
    },
}
