//! # Eyebreak Core Library
//!
//! This library provides the core logic for Eyebreak, a break-reminder
//! scheduler that periodically prompts the user to rest their eyes and keeps
//! a small gamified progress state. Hosts (the CLI, or any other shell)
//! supply a timer backend, a key-value store and a notification surface;
//! everything else lives here.
//!
//! ## Architecture
//!
//! - **Scheduler Core**: alarm lifecycle, pause/resume/snooze and startup
//!   recovery, reconciling the timer platform with the persisted fire time
//! - **Session**: break lifecycle state machine and progress arithmetic
//! - **Router**: named request/response operations for the presentation layer
//! - **Worker**: the event loop tying timers, notifications and requests together
//! - **Storage**: async key-value store (in-memory or SQLite) and TOML configuration
//!
//! ## Key Components
//!
//! - [`SchedulerCore`]: owns the one pending alarm
//! - [`SessionMachine`]: break outcomes and rewards
//! - [`BackgroundWorker`]: long-running loop with a [`WorkerHandle`]
//! - [`Config`]: engine configuration management

pub mod error;
pub mod events;
pub mod notify;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod timer;
pub mod worker;

pub use error::{ConfigError, CoreError, NotifyError, StoreError, TimerError};
pub use events::Event;
pub use notify::{Notification, NotificationAction, Notifier, RecordingNotifier};
pub use router::{MessageRouter, Request, Response};
pub use scheduler::{RecoveryPlan, SchedulerCore, TimeRemaining};
pub use session::{CompletionReport, SessionMachine, SnoozeReport};
pub use storage::{Config, KeyValueStore, MemoryStore, ProgressState, Settings, SqliteStore};
pub use timer::{AlarmFired, AlarmName, Clock, SystemClock, TimerPrimitive, TokioTimers};
pub use worker::{BackgroundWorker, InstallReason, WorkerError, WorkerHandle};
