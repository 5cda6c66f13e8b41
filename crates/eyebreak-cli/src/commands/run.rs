//! `eyebreak-cli run`: host the background worker over stdin/stdout.
//!
//! Every input line is a router request (`{"action": ...}`) or a
//! notification action (`{"event": ...}`) and gets exactly one reply line.
//! Prompts from the worker are written in between, tagged with `type`.

use std::sync::Arc;

use eyebreak_core::router::Ack;
use eyebreak_core::{Config, NotificationAction, Request, WorkerHandle};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use super::{build_worker, CliResult};
use crate::notifier::TerminalNotifier;

/// A parsed input line.
#[derive(Debug, PartialEq)]
pub enum Input {
    Request(Request),
    Action(NotificationAction),
}

pub fn parse_input(line: &str) -> Result<Input, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    if value.get("action").is_some() {
        serde_json::from_value(value)
            .map(Input::Request)
            .map_err(|e| format!("invalid request: {e}"))
    } else if value.get("event").is_some() {
        serde_json::from_value(value)
            .map(Input::Action)
            .map_err(|e| format!("invalid notification action: {e}"))
    } else {
        Err("expected an \"action\" or \"event\" field".into())
    }
}

async fn dispatch(handle: &WorkerHandle, line: &str) -> String {
    let reply = match parse_input(line) {
        Ok(Input::Request(request)) => match handle.request(request).await {
            Ok(response) => serde_json::to_string(&response),
            Err(e) => serde_json::to_string(&Ack {
                success: false,
                error: Some(e.to_string()),
            }),
        },
        Ok(Input::Action(action)) => {
            let ack = match handle.notification_action(action) {
                Ok(()) => Ack::ok(),
                Err(e) => Ack {
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            serde_json::to_string(&ack)
        }
        Err(error) => {
            tracing::debug!(%error, "rejected input line");
            serde_json::to_string(&Ack {
                success: false,
                error: Some(error),
            })
        }
    };
    reply.unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{e}"}}"#))
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

pub async fn run() -> CliResult {
    let config = Config::load_or_default();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));

    let notifier = Arc::new(TerminalNotifier::new(out_tx.clone()));
    let (worker, handle) = build_worker(&config, notifier)?;
    let plan = worker.on_startup().await?;
    tracing::info!(?plan, "worker ready");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker_task = tokio::spawn(worker.run(async {
        let _ = stop_rx.await;
    }));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = dispatch(&handle, &line).await;
                if out_tx.send(reply).is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    let _ = stop_tx.send(());
    drop(handle);
    worker_task.await?;
    drop(out_tx);
    writer.await??;
    Ok(())
}
