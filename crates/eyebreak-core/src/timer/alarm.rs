use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TimerError;

/// Timer identities owned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmName {
    #[serde(rename = "eyeBreak")]
    Primary,
    #[serde(rename = "eyeBreakSnooze")]
    Snooze,
}

impl AlarmName {
    pub const ALL: [AlarmName; 2] = [AlarmName::Primary, AlarmName::Snooze];

    pub fn as_str(self) -> &'static str {
        match self {
            AlarmName::Primary => "eyeBreak",
            AlarmName::Snooze => "eyeBreakSnooze",
        }
    }
}

impl fmt::Display for AlarmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending alarm as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmInfo {
    pub name: AlarmName,
    /// Absolute fire time (ms since epoch).
    pub scheduled_time_ms: u64,
}

impl AlarmInfo {
    /// An alarm due `delay` after `now_ms`, saturating at `u64::MAX`.
    pub fn after(name: AlarmName, now_ms: u64, delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            name,
            scheduled_time_ms: now_ms.saturating_add(delay_ms),
        }
    }
}

/// Delivered when an alarm triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFired {
    pub name: AlarmName,
    pub scheduled_time_ms: u64,
}

/// Platform-provided one-shot timer, addressed by name.
///
/// Creating an alarm under a name that is already pending replaces it.
/// `clear` is idempotent and reports whether something was removed.
#[async_trait]
pub trait TimerPrimitive: Send + Sync {
    async fn create(&self, alarm: AlarmName, delay: Duration) -> Result<AlarmInfo, TimerError>;

    async fn clear(&self, alarm: AlarmName) -> bool;

    async fn get(&self, alarm: AlarmName) -> Option<AlarmInfo>;

    /// All pending alarms, in `AlarmName::ALL` order.
    async fn get_all(&self) -> Vec<AlarmInfo> {
        let mut pending = Vec::new();
        for alarm in AlarmName::ALL {
            if let Some(info) = self.get(alarm).await {
                pending.push(info);
            }
        }
        pending
    }
}
