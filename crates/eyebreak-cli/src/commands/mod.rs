pub mod config;
pub mod install;
pub mod run;
pub mod stats;
pub mod status;

use std::sync::Arc;

use eyebreak_core::{
    BackgroundWorker, Config, KeyValueStore, Notifier, SchedulerCore, SessionMachine, SqliteStore,
    SystemClock, TokioTimers, WorkerHandle,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn open_store() -> Result<Arc<dyn KeyValueStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open_default()?))
}

/// Wire the worker over the on-disk store and real timers.
pub fn build_worker(
    config: &Config,
    notifier: Arc<dyn Notifier>,
) -> Result<(BackgroundWorker, WorkerHandle), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let clock = Arc::new(SystemClock);
    let (timers, alarms) = TokioTimers::new(clock.clone(), config.scheduler.min_delay());
    let scheduler = Arc::new(SchedulerCore::new(
        store,
        Arc::new(timers),
        clock,
        config.scheduler.clone(),
    ));
    let session = Arc::new(SessionMachine::new(scheduler, notifier, config));
    Ok(BackgroundWorker::new(session, alarms))
}
