//! Notification surface seam.
//!
//! The core asks a [`Notifier`] to show the break prompt; the host feeds
//! the user's reaction back as a [`NotificationAction`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

pub const BREAK_NOTIFICATION_ID: &str = "eyeBreak";
pub const TEST_NOTIFICATION_ID: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    /// Button labels, primary first.
    pub actions: Vec<String>,
    pub require_interaction: bool,
}

/// User reaction reported by the notification surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum NotificationAction {
    /// Body of the notification clicked.
    Clicked,
    ButtonClicked {
        #[serde(rename = "buttonIndex")]
        button_index: usize,
    },
}

/// What a notification action means for the break session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakIntent {
    Start,
    Snooze,
}

impl NotificationAction {
    pub fn intent(self) -> Option<BreakIntent> {
        match self {
            NotificationAction::Clicked | NotificationAction::ButtonClicked { button_index: 0 } => {
                Some(BreakIntent::Start)
            }
            NotificationAction::ButtonClicked { button_index: 1 } => Some(BreakIntent::Snooze),
            NotificationAction::ButtonClicked { .. } => None,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError>;

    async fn clear(&self, id: &str);

    /// Bring up the break countdown view. Hosts without one ignore it.
    async fn open_break_view(&self) {}
}

/// Notifier that remembers what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
    cleared: Mutex<Vec<String>>,
    views_opened: Mutex<usize>,
    failure: Mutex<Option<NotifyError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `show` fail with `error`.
    pub fn fail_with(&self, error: NotifyError) {
        *Self::lock(&self.failure) = Some(error);
    }

    pub fn shown(&self) -> Vec<Notification> {
        Self::lock(&self.shown).clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        Self::lock(&self.cleared).clone()
    }

    pub fn views_opened(&self) -> usize {
        *Self::lock(&self.views_opened)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(error) = Self::lock(&self.failure).clone() {
            return Err(error);
        }
        Self::lock(&self.shown).push(notification.clone());
        Ok(())
    }

    async fn clear(&self, id: &str) {
        Self::lock(&self.cleared).push(id.to_string());
    }

    async fn open_break_view(&self) {
        *Self::lock(&self.views_opened) += 1;
    }
}
