//! Deterministic timer backend driven by a [`ManualClock`].
//!
//! Alarms never fire on their own; callers advance the clock and drain
//! [`ManualTimers::take_due`]. Used by tests and by simulations of process
//! restarts (`lose_all`).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::alarm::{AlarmInfo, AlarmName, TimerPrimitive};
use super::clock::{Clock, ManualClock};
use crate::error::TimerError;

pub struct ManualTimers {
    clock: Arc<ManualClock>,
    pending: Mutex<BTreeMap<&'static str, AlarmInfo>>,
    fail_next_create: AtomicBool,
}

impl ManualTimers {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(BTreeMap::new()),
            fail_next_create: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<&'static str, AlarmInfo>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `create` call fail as if the platform refused it.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn pending(&self) -> Vec<AlarmInfo> {
        self.lock().values().copied().collect()
    }

    /// Remove and return every alarm whose fire time has passed.
    pub fn take_due(&self) -> Vec<AlarmInfo> {
        let now = self.clock.now_ms();
        let mut map = self.lock();
        let due: Vec<AlarmInfo> = map
            .values()
            .filter(|info| info.scheduled_time_ms <= now)
            .copied()
            .collect();
        for info in &due {
            map.remove(info.name.as_str());
        }
        due
    }

    /// Drop every pending alarm, as a browser restart may.
    pub fn lose_all(&self) {
        self.lock().clear();
    }
}

#[async_trait]
impl TimerPrimitive for ManualTimers {
    async fn create(&self, alarm: AlarmName, delay: Duration) -> Result<AlarmInfo, TimerError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(TimerError::CreateFailed {
                alarm,
                message: "injected failure".into(),
            });
        }
        let info = AlarmInfo::after(alarm, self.clock.now_ms(), delay);
        self.lock().insert(alarm.as_str(), info);
        Ok(info)
    }

    async fn clear(&self, alarm: AlarmName) -> bool {
        self.lock().remove(alarm.as_str()).is_some()
    }

    async fn get(&self, alarm: AlarmName) -> Option<AlarmInfo> {
        self.lock().get(alarm.as_str()).copied()
    }
}
