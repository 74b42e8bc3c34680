//! Events emitted by the client core.
//!
//! Every background component (chat channel, gateway, poller) reports
//! through one bounded channel of [`GopherEvent`]s. The presentation layer
//! reads them directly or through [`sink::drive`](crate::sink::drive).

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::channel::ConnectionState;
use crate::gateway::ActionKind;
use crate::protocol::Leaderboard;

/// Something the presentation layer may want to render.
#[derive(Debug, Clone, PartialEq)]
pub enum GopherEvent {
    /// A chat broadcast pushed by the server. Opaque HTML, unmodified.
    ChatFragment(String),
    /// A fresh leaderboard that replaces the previous one in full.
    LeaderboardSnapshot(Leaderboard),
    /// The server answered 429 to a click or a build.
    RateLimited { action: ActionKind },
    /// A user action got no response, or a status other than 2xx that is
    /// not a reported 429.
    ///
    /// Not shown to the user by the default dispatcher.
    SubmissionFailed { action: ActionKind, reason: String },
    /// A leaderboard fetch failed; the previous snapshot stays current.
    LeaderboardPollFailed { reason: String },
    /// The chat channel changed state.
    ConnectionStateChanged(ConnectionState),
}

/// Sending half of the event channel, shared by all components.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<GopherEvent>,
}

impl EventSender {
    /// Create a bounded event channel. Capacity is clamped to at least 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GopherEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emit an event without waiting. If the channel is full, log a warning
    /// and drop the event.
    pub fn emit(&self, event: GopherEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
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

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (events, mut rx) = EventSender::channel(1);
        events.emit(GopherEvent::ChatFragment("kept".into()));
        events.emit(GopherEvent::ChatFragment("dropped".into()));

        assert_eq!(rx.recv().await.unwrap(), GopherEvent::ChatFragment("kept".into()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_after_receiver_dropped_is_silent() {
        let (events, rx) = EventSender::channel(0);
        drop(rx);
        events.emit(GopherEvent::LeaderboardPollFailed {
            reason: "gone".into(),
        });
    }
}
