use chrono::{Local, TimeZone};
use eyebreak_core::storage::{load_record, BreakSession, ScheduleState};
use eyebreak_core::Settings;
use serde_json::json;

use super::{open_store, CliResult};

fn local_time(epoch_ms: u64) -> Option<String> {
    let ms = i64::try_from(epoch_ms).ok()?;
    Local.timestamp_millis_opt(ms).single().map(|t| t.to_rfc3339())
}

pub async fn run() -> CliResult {
    let store = open_store()?;
    let settings = load_record::<Settings>(store.as_ref()).await?;
    let schedule = load_record::<ScheduleState>(store.as_ref()).await?;
    let session = load_record::<BreakSession>(store.as_ref()).await?;

    let status = json!({
        "settings": settings,
        "schedule": schedule,
        "session": session,
        "nextBreakAt": schedule.next_alarm_fire_time.and_then(local_time),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
