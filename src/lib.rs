//! # Feed the Gopher Client
//!
//! Async Rust client for the Feed the Gopher multiplayer clicker game.
//!
//! The crate covers the client's real-time communication layer:
//!
//! - **Identity**: prompt once for a non-empty display name ([`identity`])
//! - **Chat channel**: a persistent WebSocket that redials on every
//!   failure and forwards pushed chat fragments ([`channel`])
//! - **Action gateway**: fire-and-forget chat, click and auto-feeder
//!   requests, with a 429 on a click or build reported as a notice ([`gateway`])
//! - **Leaderboard poller**: refresh `/top-scorers` every second ([`poller`])
//!
//! A [`Session`] owns all of them and reports through a channel of
//! [`GopherEvent`]s; a UI implements [`PresentationSink`] to render them.
//! Rendering itself is left to the embedder.

pub mod backends;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod http;
pub mod identity;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transport;
pub mod transports;

#[cfg(test)]
mod test_support;

// Re-export primary types for ergonomic imports.
pub use channel::{
    BackoffPolicy, ChannelHandle, ConnectionChannel, ConnectionState, ConstantBackoff,
    ExponentialBackoff, MessageHandler,
};
pub use config::ClientConfig;
pub use error::{GopherError, Result};
pub use event::{EventSender, GopherEvent};
pub use gateway::{Action, ActionGateway, ActionKind, SubmitOutcome};
pub use http::{HttpBackend, HttpResponse};
pub use identity::{acquire_identity, Acquisition, LinePrompt, NamePrompt, SessionIdentity};
pub use poller::{LeaderboardPoller, OverlapPolicy, PollerHandle};
pub use protocol::{AutoFeederKind, Leaderboard, ScoreEntry};
pub use session::Session;
pub use sink::PresentationSink;
pub use transport::{Connector, Transport};

#[cfg(feature = "http-reqwest")]
pub use backends::ReqwestBackend;
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
