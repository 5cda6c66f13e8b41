//! Long-running background worker.
//!
//! Owns the event loop that feeds alarm fires, notification actions, store
//! changes and presentation requests into the session machine, one at a
//! time. Hosts talk to it through a cloneable [`WorkerHandle`].

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::Result;
use crate::notify::NotificationAction;
use crate::router::{MessageRouter, Request, Response};
use crate::scheduler::RecoveryPlan;
use crate::session::SessionMachine;
use crate::storage::{ProgressState, Settings, StoreChanges, StoreMap, StoreRecord};
use crate::timer::AlarmFired;

const REQUEST_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstallReason {
    Install,
    Update,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker stopped before answering; fall back to last-known state.
    #[error("Background worker is not running")]
    MessageDeliveryFailure,
}

struct Envelope {
    request: Request,
    respond_to: oneshot::Sender<Response>,
}

#[derive(Clone)]
pub struct WorkerHandle {
    requests: mpsc::Sender<Envelope>,
    actions: mpsc::UnboundedSender<NotificationAction>,
}

impl WorkerHandle {
    pub async fn request(&self, request: Request) -> std::result::Result<Response, WorkerError> {
        let (respond_to, response) = oneshot::channel();
        self.requests
            .send(Envelope {
                request,
                respond_to,
            })
            .await
            .map_err(|_| WorkerError::MessageDeliveryFailure)?;
        response.await.map_err(|_| WorkerError::MessageDeliveryFailure)
    }

    /// Forward a user reaction from the notification surface.
    pub fn notification_action(
        &self,
        action: NotificationAction,
    ) -> std::result::Result<(), WorkerError> {
        self.actions.send(action).map_err(|_| WorkerError::MessageDeliveryFailure)
    }
}

pub struct BackgroundWorker {
    session: Arc<SessionMachine>,
    router: MessageRouter,
    alarms: mpsc::UnboundedReceiver<AlarmFired>,
    actions: mpsc::UnboundedReceiver<NotificationAction>,
    requests: mpsc::Receiver<Envelope>,
    store_changes: broadcast::Receiver<StoreChanges>,
}

impl BackgroundWorker {
    /// `alarms` is the fire stream of the timer backend the scheduler uses.
    pub fn new(
        session: Arc<SessionMachine>,
        alarms: mpsc::UnboundedReceiver<AlarmFired>,
    ) -> (Self, WorkerHandle) {
        let (requests_tx, requests) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (actions_tx, actions) = mpsc::unbounded_channel();
        let store_changes = session.scheduler().store().subscribe();
        let worker = Self {
            router: MessageRouter::new(Arc::clone(&session)),
            session,
            alarms,
            actions,
            requests,
            store_changes,
        };
        let handle = WorkerHandle {
            requests: requests_tx,
            actions: actions_tx,
        };
        (worker, handle)
    }

    pub fn session(&self) -> &Arc<SessionMachine> {
        &self.session
    }

    /// Fill in defaults for keys that are absent, then recover. Existing
    /// values are never overwritten, so an update keeps user settings.
    pub async fn on_installed(&self, reason: InstallReason) -> Result<RecoveryPlan> {
        let store = self.session.scheduler().store();
        let existing = store.get_all().await?;
        let defaults: StoreMap = Settings::default()
            .to_map()
            .into_iter()
            .chain(ProgressState::default().to_map())
            .filter(|(key, value)| !value.is_null() && !existing.contains_key(key))
            .collect();

        tracing::info!(?reason, written = defaults.len(), "installing defaults");
        if !defaults.is_empty() {
            store.set(defaults).await?;
        }
        self.on_startup().await
    }

    pub async fn on_startup(&self) -> Result<RecoveryPlan> {
        self.session.scheduler().recover_on_startup().await
    }

    /// Process events until every handle is dropped or `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let Self {
            session,
            router,
            mut alarms,
            mut actions,
            mut requests,
            mut store_changes,
        } = self;
        tokio::pin!(shutdown);
        let mut watching_store = true;

        tracing::info!("background worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("background worker shutting down");
                    break;
                }
                Some(fired) = alarms.recv() => {
                    if let Err(e) = session.on_alarm_fired(fired).await {
                        tracing::warn!(alarm = %fired.name, error = %e, "failed to handle alarm");
                    }
                }
                Some(action) = actions.recv() => {
                    if let Err(e) = session.on_notification_action(action).await {
                        tracing::warn!(?action, error = %e, "failed to handle notification action");
                    }
                }
                changes = store_changes.recv(), if watching_store => {
                    watching_store = handle_store_changes(&session, changes).await;
                }
                envelope = requests.recv() => {
                    let Some(Envelope { request, respond_to }) = envelope else {
                        tracing::info!("all worker handles dropped");
                        break;
                    };
                    let response = router.handle(request).await;
                    if respond_to.send(response).is_err() {
                        tracing::debug!("requester went away before the reply");
                    }
                }
            }
        }
    }
}

/// Keep the settings cache in line with writes made outside the router.
/// Returns false once the change stream has closed.
async fn handle_store_changes(
    session: &SessionMachine,
    changes: std::result::Result<StoreChanges, RecvError>,
) -> bool {
    let scheduler = session.scheduler();
    match changes {
        Ok(changes) => {
            if let Some((previous, current)) = scheduler.refresh_settings(&changes).await {
                tracing::debug!(?current, "settings changed externally");
                if let Err(e) = scheduler.on_settings_changed(&previous, &current).await {
                    tracing::warn!(error = %e, "failed to apply settings change");
                }
            }
            true
        }
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "missed store changes, reloading settings");
            let previous = scheduler.settings().await;
            match scheduler.load_settings().await {
                Ok(current) if current != previous => {
                    if let Err(e) = scheduler.on_settings_changed(&previous, &current).await {
                        tracing::warn!(error = %e, "failed to apply settings change");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to reload settings"),
            }
            true
        }
        Err(RecvError::Closed) => false,
    }
}
