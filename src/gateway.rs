//! Fire-and-forget submission of user actions.
//!
//! Every action has the same shape: one JSON POST, no retry, and the only
//! part of the answer that matters to the user is a 429 on a click or a
//! build. Chat never shows the notice. The server owns
//! all rate-limit and economy state, so nothing here throttles or
//! pre-checks; a burst of clicks is a burst of POSTs.
//!
//! Other failures are reported as [`GopherEvent::SubmissionFailed`] so they
//! can be observed, but the user-facing dispatcher ignores them: a lost
//! chat message or click is silently lost.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::event::{EventSender, GopherEvent};
use crate::http::HttpBackend;
use crate::identity::SessionIdentity;
use crate::protocol::{
    AutoFeederBuildRequest, AutoFeederKind, ChatMessage, HitRequest, BUILD_AUTO_FEEDER_PATH,
    REGISTER_HIT_PATH, SEND_MESSAGE_PATH,
};

/// Status the server uses to reject a too-fast action.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Which user action an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Chat,
    Click,
    Build,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chat => "chat",
            Self::Click => "click",
            Self::Build => "build",
        };
        f.write_str(name)
    }
}

/// A user action ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendChat(ChatMessage),
    RegisterHit(HitRequest),
    BuildAutoFeeder(AutoFeederBuildRequest),
}

impl Action {
    pub fn chat(value: impl Into<String>, user: &SessionIdentity) -> Self {
        Self::SendChat(ChatMessage {
            value: value.into(),
            user: user.to_string(),
        })
    }

    pub fn click(user: &SessionIdentity) -> Self {
        Self::RegisterHit(HitRequest {
            user: user.to_string(),
        })
    }

    pub fn build(user: &SessionIdentity, kind: AutoFeederKind) -> Self {
        Self::BuildAutoFeeder(AutoFeederBuildRequest {
            user: user.to_string(),
            kind,
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::SendChat(_) => ActionKind::Chat,
            Self::RegisterHit(_) => ActionKind::Click,
            Self::BuildAutoFeeder(_) => ActionKind::Build,
        }
    }

    /// Endpoint the action is posted to.
    pub fn path(&self) -> &'static str {
        match self {
            Self::SendChat(_) => SEND_MESSAGE_PATH,
            Self::RegisterHit(_) => REGISTER_HIT_PATH,
            Self::BuildAutoFeeder(_) => BUILD_AUTO_FEEDER_PATH,
        }
    }

    /// Whether a 429 for this action is shown to the user.
    pub fn reports_rate_limit(&self) -> bool {
        !matches!(self, Self::SendChat(_))
    }

    /// JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Serialization`](crate::GopherError::Serialization)
    /// if the body cannot be encoded.
    pub fn body(&self) -> crate::Result<String> {
        let body = match self {
            Self::SendChat(msg) => serde_json::to_string(msg)?,
            Self::RegisterHit(req) => serde_json::to_string(req)?,
            Self::BuildAutoFeeder(req) => serde_json::to_string(req)?,
        };
        Ok(body)
    }
}

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 2xx.
    Accepted,
    /// 429 on a click or a build.
    RateLimited,
    /// Any other status.
    Rejected { status: u16 },
    /// No response at all.
    Failed { reason: String },
}

/// Posts user actions to the server.
///
/// Cheap to clone; clones share the backend and the event channel.
#[derive(Clone)]
pub struct ActionGateway {
    backend: Arc<dyn HttpBackend>,
    events: EventSender,
}

impl ActionGateway {
    pub fn new(backend: Arc<dyn HttpBackend>, events: EventSender) -> Self {
        Self { backend, events }
    }

    /// Post `action` once and report the outcome.
    ///
    /// Emits exactly one [`GopherEvent::RateLimited`] on a reported 429 and
    /// one [`GopherEvent::SubmissionFailed`] on any other failure, a 429 on
    /// chat included. Never retries.
    pub async fn submit(&self, action: Action) -> SubmitOutcome {
        let kind = action.kind();
        let outcome = match action.body() {
            Ok(body) => match self.backend.post_json(action.path(), body).await {
                Ok(STATUS_TOO_MANY_REQUESTS) if action.reports_rate_limit() => {
                    SubmitOutcome::RateLimited
                }
                Ok(status) if (200..300).contains(&status) => SubmitOutcome::Accepted,
                Ok(status) => SubmitOutcome::Rejected { status },
                Err(e) => SubmitOutcome::Failed {
                    reason: e.to_string(),
                },
            },
            Err(e) => SubmitOutcome::Failed {
                reason: e.to_string(),
            },
        };

        match &outcome {
            SubmitOutcome::Accepted => debug!(action = %kind, "action accepted"),
            SubmitOutcome::RateLimited => {
                debug!(action = %kind, "action rate limited");
                self.events.emit(GopherEvent::RateLimited { action: kind });
            }
            SubmitOutcome::Rejected { status } => {
                warn!(action = %kind, status, "action rejected");
                self.events.emit(GopherEvent::SubmissionFailed {
                    action: kind,
                    reason: format!("server responded with status {status}"),
                });
            }
            SubmitOutcome::Failed { reason } => {
                debug!(action = %kind, %reason, "action not delivered");
                self.events.emit(GopherEvent::SubmissionFailed {
                    action: kind,
                    reason: reason.clone(),
                });
            }
        }

        outcome
    }

    /// Submit `action` in the background and return immediately.
    ///
    /// Must be called inside a tokio runtime.
    pub fn fire(&self, action: Action) {
        let gateway = self.clone();
        tokio::spawn(async move {
            gateway.submit(action).await;
        });
    }

    /// Post a chat line. The caller is responsible for not sending empty text.
    pub fn send_chat_message(&self, value: impl Into<String>, user: &SessionIdentity) {
        self.fire(Action::chat(value, user));
    }

    /// Register one click for `user`.
    pub fn register_click(&self, user: &SessionIdentity) {
        self.fire(Action::click(user));
    }

    /// Ask the server to build one auto-feeder of `kind` for `user`.
    pub fn request_auto_feeder_build(&self, user: &SessionIdentity, kind: AutoFeederKind) {
        self.fire(Action::build(user, kind));
    }
}

impl fmt::Debug for ActionGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionGateway").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::GopherError;
    use crate::test_support::MockBackend;
    use serde_json::json;

    fn ava() -> SessionIdentity {
        SessionIdentity::new("Ava").unwrap()
    }

    #[tokio::test]
    async fn chat_posts_capitalized_body() {
        let (backend, mut posts) = MockBackend::new();
        let (events, mut rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        let outcome = gateway.submit(Action::chat("hi", &ava())).await;
        assert_eq!(outcome, SubmitOutcome::Accepted);

        let post = posts.recv().await.unwrap();
        assert_eq!(post.path, "/send-message");
        assert_eq!(post.body, json!({ "Value": "hi", "User": "Ava" }));
        assert!(posts.try_recv().is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn click_posts_user() {
        let (backend, mut posts) = MockBackend::new();
        let (events, _rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        gateway.submit(Action::click(&ava())).await;

        let post = posts.recv().await.unwrap();
        assert_eq!(post.path, "/register-hit");
        assert_eq!(post.body, json!({ "user": "Ava" }));
    }

    #[tokio::test]
    async fn build_posts_user_and_type() {
        let (backend, mut posts) = MockBackend::new();
        let (events, _rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        gateway
            .submit(Action::build(&ava(), AutoFeederKind::Basic))
            .await;

        let post = posts.recv().await.unwrap();
        assert_eq!(post.path, "/build-auto-feeder");
        assert_eq!(post.body, json!({ "user": "Ava", "type": 1 }));
    }

    #[tokio::test]
    async fn rate_limited_click_emits_one_notice_and_no_retry() {
        let (backend, mut posts) = MockBackend::scripted(vec![Ok(429)], vec![]);
        let (events, mut rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        let outcome = gateway.submit(Action::click(&ava())).await;
        assert_eq!(outcome, SubmitOutcome::RateLimited);

        assert_eq!(
            rx.recv().await.unwrap(),
            GopherEvent::RateLimited {
                action: ActionKind::Click
            }
        );
        assert!(rx.try_recv().is_err());

        posts.recv().await.unwrap();
        assert!(posts.try_recv().is_err(), "a 429 must not be retried");
    }

    #[tokio::test]
    async fn rate_limited_build_emits_notice() {
        let (backend, _posts) = MockBackend::scripted(vec![Ok(429)], vec![]);
        let (events, mut rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        gateway
            .submit(Action::build(&ava(), AutoFeederKind::Industrial))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            GopherEvent::RateLimited {
                action: ActionKind::Build
            }
        );
    }

    #[tokio::test]
    async fn rate_limited_chat_shows_no_notice() {
        let (backend, _posts) = MockBackend::scripted(vec![Ok(429)], vec![]);
        let (events, mut rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        let outcome = gateway.submit(Action::chat("hi", &ava())).await;
        assert_eq!(outcome, SubmitOutcome::Rejected { status: 429 });
        assert!(matches!(
            rx.recv().await.unwrap(),
            GopherEvent::SubmissionFailed {
                action: ActionKind::Chat,
                ..
            }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn network_failure_is_reported_but_not_retried() {
        let (backend, mut posts) =
            MockBackend::scripted(vec![Err(GopherError::Http("connection reset".into()))], vec![]);
        let (events, mut rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        let outcome = gateway.submit(Action::chat("lost", &ava())).await;
        assert!(matches!(outcome, SubmitOutcome::Failed { .. }));

        match rx.recv().await.unwrap() {
            GopherEvent::SubmissionFailed { action, reason } => {
                assert_eq!(action, ActionKind::Chat);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected SubmissionFailed, got {other:?}"),
        }

        posts.recv().await.unwrap();
        assert!(posts.try_recv().is_err());
    }

    #[tokio::test]
    async fn server_error_status_is_rejected() {
        let (backend, _posts) = MockBackend::scripted(vec![Ok(500)], vec![]);
        let (events, mut rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        let outcome = gateway.submit(Action::click(&ava())).await;
        assert_eq!(outcome, SubmitOutcome::Rejected { status: 500 });
        assert!(matches!(
            rx.recv().await.unwrap(),
            GopherEvent::SubmissionFailed {
                action: ActionKind::Click,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fire_and_forget_wrappers_return_before_the_post() {
        let (backend, mut posts) = MockBackend::new();
        let (events, _rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);
        let user = ava();

        gateway.send_chat_message("hi", &user);
        gateway.register_click(&user);
        gateway.request_auto_feeder_build(&user, AutoFeederKind::Advanced);

        let mut paths = vec![
            posts.recv().await.unwrap().path,
            posts.recv().await.unwrap().path,
            posts.recv().await.unwrap().path,
        ];
        paths.sort();
        assert_eq!(
            paths,
            vec!["/build-auto-feeder", "/register-hit", "/send-message"]
        );
    }

    #[tokio::test]
    async fn repeated_clicks_are_not_throttled_locally() {
        let (backend, mut posts) = MockBackend::new();
        let (events, _rx) = EventSender::channel(8);
        let gateway = ActionGateway::new(backend, events);

        for _ in 0..20 {
            gateway.submit(Action::click(&ava())).await;
        }
        let mut count = 0;
        while posts.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
