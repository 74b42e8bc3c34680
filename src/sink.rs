//! The presentation-layer collaborator.
//!
//! A UI implements [`PresentationSink`] and lets [`drive`] feed it from the
//! session's event channel. Submission and poll failures are not passed
//! on: the user sees stale data, never an error.

use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::ConnectionState;
use crate::event::GopherEvent;
use crate::gateway::ActionKind;
use crate::protocol::ScoreEntry;

/// Notice shown when the server rate-limits an action.
pub const RATE_LIMIT_NOTICE: &str = "woah there partner slow down you can only feed so fast";

/// Renders what the client core produces.
pub trait PresentationSink {
    /// Append one chat broadcast to the log.
    fn on_chat_fragment(&mut self, html: &str);

    /// Replace the rendered leaderboard with `entries`, ordered by rank.
    fn on_leaderboard_snapshot(&mut self, entries: &[ScoreEntry]);

    /// Tell the user to slow down (see [`RATE_LIMIT_NOTICE`]).
    fn on_rate_limited(&mut self, action: ActionKind);

    /// The chat channel changed state. Ignored unless overridden.
    fn on_connection_state(&mut self, _state: ConnectionState) {}
}

/// Route one event to the matching sink method.
pub fn dispatch(event: &GopherEvent, sink: &mut impl PresentationSink) {
    match event {
        GopherEvent::ChatFragment(html) => sink.on_chat_fragment(html),
        GopherEvent::LeaderboardSnapshot(board) => sink.on_leaderboard_snapshot(&board.elements),
        GopherEvent::RateLimited { action } => sink.on_rate_limited(*action),
        GopherEvent::ConnectionStateChanged(state) => sink.on_connection_state(*state),
        GopherEvent::SubmissionFailed { action, reason } => {
            debug!(%action, %reason, "submission failure not shown");
        }
        GopherEvent::LeaderboardPollFailed { reason } => {
            debug!(%reason, "poll failure not shown");
        }
    }
}

/// Dispatch every event until the channel closes.
pub async fn drive(mut events: mpsc::Receiver<GopherEvent>, sink: &mut impl PresentationSink) {
    while let Some(event) = events.recv().await {
        dispatch(&event, sink);
    }
    debug!("event channel closed, presentation driver exiting");
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
    use crate::event::EventSender;
    use crate::protocol::Leaderboard;

    #[derive(Default)]
    struct RecordingSink {
        chat: Vec<String>,
        boards: Vec<Vec<ScoreEntry>>,
        notices: Vec<ActionKind>,
    }

    impl PresentationSink for RecordingSink {
        fn on_chat_fragment(&mut self, html: &str) {
            self.chat.push(html.to_string());
        }

        fn on_leaderboard_snapshot(&mut self, entries: &[ScoreEntry]) {
            self.boards.push(entries.to_vec());
        }

        fn on_rate_limited(&mut self, action: ActionKind) {
            self.notices.push(action);
        }
    }

    #[test]
    fn failures_are_not_rendered() {
        let mut sink = RecordingSink::default();
        dispatch(
            &GopherEvent::SubmissionFailed {
                action: ActionKind::Click,
                reason: "connection reset".into(),
            },
            &mut sink,
        );
        dispatch(
            &GopherEvent::LeaderboardPollFailed {
                reason: "timeout".into(),
            },
            &mut sink,
        );
        assert!(sink.chat.is_empty());
        assert!(sink.boards.is_empty());
        assert!(sink.notices.is_empty());
    }

    #[test]
    fn drive_routes_events_in_order() {
        let (events, rx) = EventSender::channel(16);
        let board = Leaderboard::from_json(r#"{"elements":[{"rank":1,"name":"Ava","value":42}]}"#)
            .unwrap();

        events.emit(GopherEvent::ChatFragment("Ava: hi".into()));
        events.emit(GopherEvent::LeaderboardSnapshot(board.clone()));
        events.emit(GopherEvent::RateLimited {
            action: ActionKind::Click,
        });
        events.emit(GopherEvent::ChatFragment("Bo: hey".into()));
        events.emit(GopherEvent::LeaderboardSnapshot(Leaderboard::default()));
        drop(events);

        let mut sink = RecordingSink::default();
        tokio_test::block_on(drive(rx, &mut sink));

        assert_eq!(sink.chat, vec!["Ava: hi", "Bo: hey"]);
        assert_eq!(sink.boards, vec![board.elements, vec![]]);
        assert_eq!(sink.notices, vec![ActionKind::Click]);
    }
}
