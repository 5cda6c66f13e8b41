//! Timer primitive seam.
//!
//! A timer is a named one-shot delayed trigger. The scheduler only ever
//! talks to [`TimerPrimitive`]; the concrete backends are a tokio task per
//! alarm ([`TokioTimers`]) and a clock-driven fake ([`ManualTimers`]).

mod alarm;
mod clock;
mod manual;
mod tokio_timers;

pub use alarm::{AlarmFired, AlarmInfo, AlarmName, TimerPrimitive};
pub use clock::{local_date, Clock, ManualClock, SystemClock};
pub use manual::ManualTimers;
pub use tokio_timers::TokioTimers;
