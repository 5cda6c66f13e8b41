//! Notifier that reports prompts to the host as JSON lines on stdout.

use async_trait::async_trait;
use eyebreak_core::{Notification, Notifier, NotifyError};
use serde::Serialize;
use tokio::sync::mpsc;

/// Unsolicited messages written between responses. Tagged with `type` so a
/// host can tell them apart from replies.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage<'a> {
    Notification(&'a Notification),
    ClearNotification { id: &'a str },
    OpenBreakView,
}

pub struct TerminalNotifier {
    out: mpsc::UnboundedSender<String>,
}

impl TerminalNotifier {
    pub fn new(out: mpsc::UnboundedSender<String>) -> Self {
        Self { out }
    }

    fn emit(&self, message: &HostMessage<'_>) -> Result<(), NotifyError> {
        let line = serde_json::to_string(message)
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;
        self.out
            .send(line)
            .map_err(|_| NotifyError::Rejected("host output closed".into()))
    }
}

#[async_trait]
impl Notifier for TerminalNotifier {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(id = %notification.id, title = %notification.title, "showing notification");
        self.emit(&HostMessage::Notification(notification))
    }

    async fn clear(&self, id: &str) {
        if let Err(e) = self.emit(&HostMessage::ClearNotification { id }) {
            tracing::debug!(error = %e, "could not clear notification");
        }
    }

    async fn open_break_view(&self) {
        if let Err(e) = self.emit(&HostMessage::OpenBreakView) {
            tracing::debug!(error = %e, "could not open break view");
        }
    }
}
