//! The per-session context that ties the components together.
//!
//! A [`Session`] is built once, after the display name is known, and owns
//! the chat channel, the action gateway and the leaderboard poller. All
//! three report through one bounded event channel returned from
//! [`Session::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let identity = acquire_identity(&mut LinePrompt::new(stdin.lock(), stdout))?;
//! let config = ClientConfig::from_env()?;
//! let (mut session, events) = Session::connect(identity, &config)?;
//!
//! session.user_requests_click();
//! sink::drive(events, &mut my_ui).await;
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::channel::{
    BackoffPolicy, ChannelHandle, ConnectionChannel, ConnectionState, ConstantBackoff,
    MessageHandler,
};
use crate::config::ClientConfig;
use crate::event::{EventSender, GopherEvent};
use crate::gateway::ActionGateway;
use crate::http::HttpBackend;
use crate::identity::SessionIdentity;
use crate::poller::{LeaderboardPoller, PollerHandle};
use crate::protocol::AutoFeederKind;
use crate::transport::Connector;

/// Forwards channel output onto the event channel.
struct ChatForwarder {
    events: EventSender,
}

impl MessageHandler for ChatForwarder {
    fn on_message(&mut self, raw: String) {
        self.events.emit(GopherEvent::ChatFragment(raw));
    }

    fn on_state(&mut self, state: ConnectionState) {
        self.events.emit(GopherEvent::ConnectionStateChanged(state));
    }
}

/// A running game session for one display name.
pub struct Session {
    identity: SessionIdentity,
    gateway: ActionGateway,
    channel: ChannelHandle,
    poller: PollerHandle,
}

impl Session {
    /// Open the chat channel, start the leaderboard poller and return the
    /// session together with its event receiver.
    ///
    /// The chat channel redials every `config.reconnect_interval`. Must be
    /// called inside a tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        identity: SessionIdentity,
        config: &ClientConfig,
        backend: Arc<dyn HttpBackend>,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::Receiver<GopherEvent>) {
        let backoff = ConstantBackoff::new(config.reconnect_interval);
        Self::start_with_backoff(identity, config, backend, connector, backoff)
    }

    /// [`start`](Self::start) with a custom redial policy for the chat
    /// channel, e.g. an [`ExponentialBackoff`](crate::ExponentialBackoff).
    /// `config.reconnect_interval` is not used.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start_with_backoff(
        identity: SessionIdentity,
        config: &ClientConfig,
        backend: Arc<dyn HttpBackend>,
        connector: Arc<dyn Connector>,
        backoff: impl BackoffPolicy,
    ) -> (Self, mpsc::Receiver<GopherEvent>) {
        let (events, event_rx) = EventSender::channel(config.event_channel_capacity);

        let gateway = ActionGateway::new(Arc::clone(&backend), events.clone());

        let channel = ConnectionChannel::new(config.connect_url())
            .with_backoff(backoff)
            .with_shutdown_timeout(config.shutdown_timeout)
            .open(
                connector,
                ChatForwarder {
                    events: events.clone(),
                },
            );

        let poller = LeaderboardPoller::new(backend, events)
            .with_interval(config.poll_interval)
            .with_overlap(config.poll_overlap)
            .start();

        info!(name = %identity, server = %config.base_url, "session started");

        let session = Self {
            identity,
            gateway,
            channel,
            poller,
        };
        (session, event_rx)
    }

    /// [`start`](Self::start) with the reqwest backend and the WebSocket
    /// connector.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::InvalidBaseUrl`](crate::GopherError::InvalidBaseUrl)
    /// if the configured base URL is unusable.
    #[cfg(all(feature = "http-reqwest", feature = "transport-websocket"))]
    pub fn connect(
        identity: SessionIdentity,
        config: &ClientConfig,
    ) -> crate::Result<(Self, mpsc::Receiver<GopherEvent>)> {
        let backend = crate::backends::ReqwestBackend::new(&config.base_url)?;
        let connector = crate::transports::WebSocketConnector::new();
        Ok(Self::start(
            identity,
            config,
            Arc::new(backend),
            Arc::new(connector),
        ))
    }

    // ── UI intents ──────────────────────────────────────────────────

    /// Send a chat line. Empty text is ignored.
    pub fn user_requests_send(&self, text: &str) {
        if text.is_empty() {
            debug!("ignoring empty chat line");
            return;
        }
        self.gateway.send_chat_message(text, &self.identity);
    }

    /// Feed the gopher once.
    pub fn user_requests_click(&self) {
        self.gateway.register_click(&self.identity);
    }

    /// Buy one auto-feeder of `kind`.
    pub fn user_requests_build(&self, kind: AutoFeederKind) {
        self.gateway.request_auto_feeder_build(&self.identity, kind);
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn gateway(&self) -> &ActionGateway {
        &self.gateway
    }

    /// Current state of the chat channel.
    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    /// Watch chat channel state transitions.
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.channel.subscribe_state()
    }

    /// Close the chat channel and stop polling.
    ///
    /// Submissions already in flight are left to finish on their own.
    pub async fn shutdown(&mut self) {
        debug!("session: shutdown requested");
        self.poller.stop().await;
        self.channel.shutdown().await;
        info!(name = %self.identity, "session closed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("connection_state", &self.connection_state())
            .field("polling", &self.poller.is_running())
            .finish()
    }
}
