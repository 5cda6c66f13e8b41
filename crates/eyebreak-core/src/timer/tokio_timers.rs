//! Timer backend running one tokio task per pending alarm.
//!
//! Fires are delivered on the channel returned by [`TokioTimers::new`].
//! Nothing survives a process exit; the scheduler's startup recovery
//! re-arms alarms from the persisted fire time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::alarm::{AlarmFired, AlarmInfo, AlarmName, TimerPrimitive};
use super::clock::Clock;
use crate::error::TimerError;

struct Pending {
    info: AlarmInfo,
    generation: u64,
    task: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<AlarmName, Pending>>>;

pub struct TokioTimers {
    clock: Arc<dyn Clock>,
    min_delay: Duration,
    pending: PendingMap,
    generation: AtomicU64,
    fired_tx: mpsc::UnboundedSender<AlarmFired>,
}

impl TokioTimers {
    /// Create the backend. `min_delay` is the platform granularity; shorter
    /// requests are stretched to it.
    pub fn new(
        clock: Arc<dyn Clock>,
        min_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<AlarmFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timers = Self {
            clock,
            min_delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            fired_tx,
        };
        (timers, fired_rx)
    }

    fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<AlarmName, Pending>> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TimerPrimitive for TokioTimers {
    async fn create(&self, alarm: AlarmName, delay: Duration) -> Result<AlarmInfo, TimerError> {
        if self.fired_tx.is_closed() {
            return Err(TimerError::Closed);
        }

        let delay = delay.max(self.min_delay);
        let info = AlarmInfo::after(alarm, self.clock.now_ms(), delay);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        // Held until the entry is inserted so a zero-length sleep cannot
        // observe an empty map.
        let mut map = Self::lock(&self.pending);
        let pending = Arc::clone(&self.pending);
        let fired_tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_current = {
                let mut map = Self::lock(&pending);
                match map.get(&alarm) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&alarm);
                        true
                    }
                    _ => false,
                }
            };
            if still_current {
                let _ = fired_tx.send(AlarmFired {
                    name: alarm,
                    scheduled_time_ms: info.scheduled_time_ms,
                });
            }
        });

        let replaced = map.insert(
            alarm,
            Pending {
                info,
                generation,
                task,
            },
        );
        drop(map);
        if let Some(old) = replaced {
            old.task.abort();
        }
        Ok(info)
    }

    async fn clear(&self, alarm: AlarmName) -> bool {
        match Self::lock(&self.pending).remove(&alarm) {
            Some(entry) => {
                entry.task.abort();
                true
            }
            None => false,
        }
    }

    async fn get(&self, alarm: AlarmName) -> Option<AlarmInfo> {
        Self::lock(&self.pending).get(&alarm).map(|entry| entry.info)
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, entry) in Self::lock(&self.pending).drain() {
            entry.task.abort();
        }
    }
}
