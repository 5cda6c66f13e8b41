use std::sync::Arc;

use eyebreak_core::{Config, InstallReason};
use tokio::sync::mpsc;

use super::{build_worker, CliResult};
use crate::notifier::TerminalNotifier;

pub async fn run(update: bool) -> CliResult {
    let config = Config::load()?;
    // Nothing is shown during install.
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let (worker, _handle) = build_worker(&config, Arc::new(TerminalNotifier::new(out_tx)))?;

    let reason = if update {
        InstallReason::Update
    } else {
        InstallReason::Install
    };
    let plan = worker.on_installed(reason).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
