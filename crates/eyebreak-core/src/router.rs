//! Request/response dispatch for the presentation layer.
//!
//! Requests arrive as `{ "action": <name>, ...inputs }`. Handlers only
//! dispatch and fill in defaults; internal errors are logged and reported
//! as `success: false`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scheduler::TimeRemaining;
use crate::session::{CompletionReport, SessionMachine, SnoozeReport};
use crate::storage::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetTimeRemaining,
    EnableBreaks,
    DisableBreaks,
    PauseTimer,
    ResumeTimer,
    ResetTimer,
    /// Missing fields keep their current value.
    ApplySettings {
        #[serde(default)]
        interval: Option<u32>,
        #[serde(default)]
        duration: Option<u32>,
        #[serde(default, rename = "snoozeMinutes")]
        snooze_minutes: Option<u32>,
        #[serde(default)]
        enabled: Option<bool>,
    },
    SnoozeBreak,
    BreakComplete,
    BreakSkipped,
    TestNotification,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetTimeRemaining => "getTimeRemaining",
            Request::EnableBreaks => "enableBreaks",
            Request::DisableBreaks => "disableBreaks",
            Request::PauseTimer => "pauseTimer",
            Request::ResumeTimer => "resumeTimer",
            Request::ResetTimer => "resetTimer",
            Request::ApplySettings { .. } => "applySettings",
            Request::SnoozeBreak => "snoozeBreak",
            Request::BreakComplete => "breakComplete",
            Request::BreakSkipped => "breakSkipped",
            Request::TestNotification => "testNotification",
        }
    }
}

/// Plain `{ success, error? }` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseReport {
    pub success: bool,
    pub paused_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    TimeRemaining(TimeRemaining),
    Paused(PauseReport),
    Snoozed(SnoozeReport),
    Completed(CompletionReport),
    Ack(Ack),
}

impl Response {
    pub fn success(&self) -> bool {
        match self {
            Response::TimeRemaining(_) => true,
            Response::Paused(r) => r.success,
            Response::Snoozed(r) => r.success,
            Response::Completed(r) => r.success,
            Response::Ack(r) => r.success,
        }
    }
}

/// Maps a `Result<bool>`-ish outcome to an [`Ack`], logging failures.
fn ack<E: std::fmt::Display>(action: &str, result: Result<bool, E>) -> Response {
    match result {
        Ok(success) => Response::Ack(Ack {
            success,
            error: None,
        }),
        Err(e) => {
            tracing::warn!(action, error = %e, "request failed");
            Response::Ack(Ack::failed())
        }
    }
}

pub struct MessageRouter {
    session: Arc<SessionMachine>,
}

impl MessageRouter {
    pub fn new(session: Arc<SessionMachine>) -> Self {
        Self { session }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let action = request.name();
        tracing::debug!(action, "request received");
        let scheduler = self.session.scheduler();

        match request {
            Request::GetTimeRemaining => match scheduler.time_remaining().await {
                Ok(remaining) => Response::TimeRemaining(remaining),
                Err(e) => {
                    tracing::warn!(action, error = %e, "request failed");
                    let settings = scheduler.settings().await;
                    Response::TimeRemaining(TimeRemaining {
                        time_remaining_ms: settings.interval_ms(),
                        is_snoozed: false,
                        is_paused: false,
                    })
                }
            },
            Request::EnableBreaks | Request::DisableBreaks => {
                let settings = Settings {
                    enabled: matches!(request, Request::EnableBreaks),
                    ..scheduler.settings().await
                };
                ack(action, scheduler.apply_settings(settings).await.map(|_| true))
            }
            Request::PauseTimer => match scheduler.pause().await {
                Ok(remaining) => Response::Paused(PauseReport {
                    success: true,
                    paused_remaining_ms: Some(remaining),
                }),
                Err(e) => {
                    tracing::warn!(action, error = %e, "request failed");
                    Response::Paused(PauseReport::default())
                }
            },
            Request::ResumeTimer => ack(action, scheduler.resume().await.map(|_| true)),
            Request::ResetTimer => ack(action, scheduler.reset().await.map(|_| true)),
            Request::ApplySettings {
                interval,
                duration,
                snooze_minutes,
                enabled,
            } => {
                let current = scheduler.settings().await;
                let settings = Settings {
                    interval_minutes: interval.unwrap_or(current.interval_minutes),
                    break_duration_seconds: duration.unwrap_or(current.break_duration_seconds),
                    snooze_minutes: snooze_minutes.unwrap_or(current.snooze_minutes),
                    enabled: enabled.unwrap_or(current.enabled),
                    ..current
                };
                ack(action, scheduler.apply_settings(settings).await.map(|_| true))
            }
            Request::SnoozeBreak => match self.session.snooze().await {
                Ok(report) => Response::Snoozed(report),
                Err(e) => {
                    tracing::warn!(action, error = %e, "request failed");
                    Response::Snoozed(SnoozeReport {
                        success: false,
                        snooze_minutes: scheduler.settings().await.snooze_minutes,
                    })
                }
            },
            Request::BreakComplete => match self.session.break_complete().await {
                Ok(report) => Response::Completed(report),
                Err(e) => {
                    tracing::warn!(action, error = %e, "request failed");
                    Response::Completed(CompletionReport::default())
                }
            },
            Request::BreakSkipped => ack(action, self.session.break_skipped().await),
            Request::TestNotification => match self.session.test_notification().await {
                Ok(()) => Response::Ack(Ack::ok()),
                Err(e) => Response::Ack(Ack {
                    success: false,
                    error: Some(e.to_string()),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::NotifyError;
    use crate::notify::RecordingNotifier;
    use crate::scheduler::SchedulerCore;
    use crate::storage::{Config, MemoryStore};
    use crate::timer::{ManualClock, ManualTimers};
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    async fn router() -> (MessageRouter, Arc<ManualTimers>, Arc<RecordingNotifier>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let timers = Arc::new(ManualTimers::new(clock.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let config = Config::default();
        let scheduler = Arc::new(SchedulerCore::new(
            Arc::new(MemoryStore::new()),
            timers.clone(),
            clock,
            config.scheduler.clone(),
        ));
        scheduler.load_settings().await.unwrap();
        let session = Arc::new(SessionMachine::with_rng(
            scheduler,
            notifier.clone(),
            &config,
            Pcg64Mcg::seed_from_u64(3),
        ));
        (MessageRouter::new(session), timers, notifier)
    }

    #[test]
    fn requests_parse_from_action_json() {
        let req: Request = serde_json::from_value(json!({"action": "pauseTimer"})).unwrap();
        assert_eq!(req, Request::PauseTimer);

        let req: Request =
            serde_json::from_value(json!({"action": "applySettings", "interval": 30, "snoozeMinutes": 2}))
                .unwrap();
        assert_eq!(
            req,
            Request::ApplySettings {
                interval: Some(30),
                duration: None,
                snooze_minutes: Some(2),
                enabled: None,
            }
        );
        assert!(serde_json::from_value::<Request>(json!({"action": "selfDestruct"})).is_err());
    }

    #[tokio::test]
    async fn pause_reports_remaining_in_camel_case() {
        let (router, _, _) = router().await;
        router
            .handle(Request::ApplySettings {
                interval: Some(5),
                duration: None,
                snooze_minutes: None,
                enabled: None,
            })
            .await;
        let response = serde_json::to_value(router.handle(Request::PauseTimer).await).unwrap();
        assert_eq!(response, json!({"success": true, "pausedRemainingMs": 300_000}));
    }

    #[tokio::test]
    async fn apply_settings_keeps_unspecified_fields() {
        let (router, _, _) = router().await;
        router
            .handle(Request::ApplySettings {
                interval: None,
                duration: Some(45),
                snooze_minutes: None,
                enabled: None,
            })
            .await;
        let settings = router.session.scheduler().settings().await;
        assert_eq!(settings.break_duration_seconds, 45);
        assert_eq!(settings.interval_minutes, 20);
        assert!(settings.enabled);
    }

    #[tokio::test]
    async fn disable_clears_pending_alarm() {
        let (router, timers, _) = router().await;
        router.handle(Request::EnableBreaks).await;
        assert_eq!(timers.pending().len(), 1);
        let response = router.handle(Request::DisableBreaks).await;
        assert!(response.success());
        assert!(timers.pending().is_empty());
    }

    #[tokio::test]
    async fn time_remaining_shape() {
        let (router, _, _) = router().await;
        let response = serde_json::to_value(router.handle(Request::GetTimeRemaining).await).unwrap();
        assert_eq!(
            response,
            json!({"timeRemainingMs": 1_200_000, "isSnoozed": false, "isPaused": false})
        );
    }

    #[tokio::test]
    async fn break_complete_without_break_fails_quietly() {
        let (router, _, _) = router().await;
        let response = router.handle(Request::BreakComplete).await;
        assert!(!response.success());
    }

    #[tokio::test]
    async fn test_notification_reports_error_string() {
        let (router, _, notifier) = router().await;
        notifier.fail_with(NotifyError::Rejected("blocked by os".into()));
        let response = serde_json::to_value(router.handle(Request::TestNotification).await).unwrap();
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("blocked by os"));
    }
}
