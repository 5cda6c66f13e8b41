use eyebreak_core::session::level_threshold;
use eyebreak_core::storage::load_record;
use eyebreak_core::ProgressState;
use serde_json::json;

use super::{open_store, CliResult};

pub async fn run() -> CliResult {
    let store = open_store()?;
    let progress = load_record::<ProgressState>(store.as_ref()).await?;
    let xp_needed = level_threshold(progress.pet_level);

    let mut stats = serde_json::to_value(&progress)?;
    if let Some(obj) = stats.as_object_mut() {
        obj.insert("xpNeeded".into(), json!(xp_needed));
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
