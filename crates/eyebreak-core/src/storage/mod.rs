mod config;
mod kv;
mod sqlite;
pub mod state;

pub use config::{Config, LoggingConfig, RewardsConfig, SchedulerConfig, SkipConfig, SkipPolicy};
pub use kv::{patch, KeyValueStore, MemoryStore, StoreChanges, StoreMap, ValueChange};
pub use sqlite::{SqliteStore, DEFAULT_NAMESPACE};
pub use state::{
    keys, load_record, BreakPhase, BreakSession, PetMood, ProgressState, ScheduleState,
    Settings, StoreRecord, StoreSnapshot, MAX_EYE_SCORE,
};

use std::path::PathBuf;

/// Returns the data directory: `$EYEBREAK_DATA_DIR` when set, otherwise
/// `~/.config/eyebreak[-dev]/` based on EYEBREAK_ENV.
///
/// Set EYEBREAK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("EYEBREAK_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("EYEBREAK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("eyebreak-dev")
            } else {
                base_dir.join("eyebreak")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
