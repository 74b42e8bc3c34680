//! Fixed-interval leaderboard refresh.
//!
//! Every tick fetches `/top-scorers` and emits the result as a
//! [`GopherEvent::LeaderboardSnapshot`] that replaces whatever was shown
//! before. A failed fetch emits [`GopherEvent::LeaderboardPollFailed`] and
//! nothing else, so the last good snapshot stays on screen. There is no
//! retry and no request timeout.
//!
//! With [`OverlapPolicy::Concurrent`] a slow fetch does not hold back the
//! next tick, so responses may arrive out of issue order and an older
//! snapshot can land after a newer one. [`OverlapPolicy::SkipWhileInFlight`]
//! keeps at most one fetch running and skips ticks until it completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{GopherError, Result};
use crate::event::{EventSender, GopherEvent};
use crate::http::HttpBackend;
use crate::protocol::{Leaderboard, TOP_SCORERS_PATH};

/// Leaderboard refresh period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What to do when a tick fires while a fetch is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Start another fetch regardless.
    #[default]
    Concurrent,
    /// Skip the tick.
    SkipWhileInFlight,
}

/// Builder for the background leaderboard refresh.
pub struct LeaderboardPoller {
    backend: Arc<dyn HttpBackend>,
    events: EventSender,
    interval: Duration,
    overlap: OverlapPolicy,
}

impl LeaderboardPoller {
    pub fn new(backend: Arc<dyn HttpBackend>, events: EventSender) -> Self {
        Self {
            backend,
            events,
            interval: DEFAULT_POLL_INTERVAL,
            overlap: OverlapPolicy::default(),
        }
    }

    /// Set the refresh period. Clamped to at least 1 ms.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    /// Start polling. The first fetch happens one interval from now.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> PollerHandle {
        let task = tokio::spawn(poll_loop(
            self.backend,
            self.events,
            self.interval,
            self.overlap,
        ));
        PollerHandle { task: Some(task) }
    }
}

impl fmt::Debug for LeaderboardPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderboardPoller")
            .field("interval", &self.interval)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

/// Handle on a running poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop ticking and abandon any fetch still in flight.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(join_err) = task.await {
                if !join_err.is_cancelled() {
                    warn!("poll loop terminated with join error: {join_err}");
                }
            }
        }
    }

    /// Returns `true` until [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Fetch and decode one snapshot.
///
/// # Errors
///
/// Returns [`GopherError::Http`] when the request fails,
/// [`GopherError::UnexpectedStatus`] for a non-2xx answer and
/// [`GopherError::Serialization`] for a body that is not a leaderboard.
pub async fn fetch_leaderboard(backend: &dyn HttpBackend) -> Result<Leaderboard> {
    let response = backend.get(TOP_SCORERS_PATH).await?;
    if !response.is_success() {
        return Err(GopherError::UnexpectedStatus(response.status));
    }
    Leaderboard::from_json(&response.body)
}

async fn poll_once(backend: Arc<dyn HttpBackend>, events: EventSender) {
    match fetch_leaderboard(backend.as_ref()).await {
        Ok(board) => {
            debug!(entries = board.elements.len(), "leaderboard refreshed");
            events.emit(GopherEvent::LeaderboardSnapshot(board));
        }
        Err(e) => {
            debug!("leaderboard poll failed: {e}");
            events.emit(GopherEvent::LeaderboardPollFailed {
                reason: e.to_string(),
            });
        }
    }
}

async fn poll_loop(
    backend: Arc<dyn HttpBackend>,
    events: EventSender,
    period: Duration,
    overlap: OverlapPolicy,
) {
    debug!(?period, ?overlap, "poll loop started");

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if overlap == OverlapPolicy::SkipWhileInFlight && !in_flight.is_empty() {
                    debug!("previous leaderboard fetch still running, skipping tick");
                    continue;
                }
                in_flight.spawn(poll_once(Arc::clone(&backend), events.clone()));
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(join_err) = joined {
                    warn!("leaderboard fetch task failed: {join_err}");
                }
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
    use crate::protocol::ScoreEntry;
    use crate::test_support::{MockBackend, ScriptedGet};
    use tokio::sync::mpsc;

    fn board_json(value: u32) -> String {
        format!(r#"{{"elements":[{{"rank":1,"name":"Ava","value":{value}}}]}}"#)
    }

    fn snapshot_values(rx: &mut mpsc::Receiver<GopherEvent>) -> Vec<f64> {
        let mut values = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GopherEvent::LeaderboardSnapshot(board) = event {
                values.push(board.elements[0].value);
            }
        }
        values
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_snapshot_per_interval() {
        let script = (1..=5)
            .map(|v| ScriptedGet::ok(Duration::ZERO, &board_json(v)))
            .collect();
        let (backend, _posts) = MockBackend::scripted(vec![], script);
        let (events, mut rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend.clone(), events).start();

        tokio::time::sleep(Duration::from_millis(5500)).await;
        handle.stop().await;

        assert_eq!(backend.get_count(), 5);
        assert_eq!(snapshot_values(&mut rx), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_fetch_waits_one_interval() {
        let (backend, _posts) = MockBackend::new();
        let (events, _rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend.clone(), events).start();

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(backend.get_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(backend.get_count(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_carries_ordered_entries() {
        let body = r#"{"elements":[
            {"rank":2,"name":"Bo","value":10},
            {"rank":1,"name":"Ava","value":42}
        ]}"#;
        let (backend, _posts) =
            MockBackend::scripted(vec![], vec![ScriptedGet::ok(Duration::ZERO, body)]);
        let (events, mut rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend, events).start();

        let event = rx.recv().await.unwrap();
        handle.stop().await;

        let GopherEvent::LeaderboardSnapshot(board) = event else {
            panic!("expected snapshot, got {event:?}");
        };
        assert_eq!(
            board.elements,
            vec![
                ScoreEntry {
                    rank: 1,
                    name: "Ava".into(),
                    value: 42.0
                },
                ScoreEntry {
                    rank: 2,
                    name: "Bo".into(),
                    value: 10.0
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_reports_and_keeps_going() {
        let (backend, _posts) = MockBackend::scripted(
            vec![],
            vec![
                ScriptedGet::err("connection refused"),
                ScriptedGet::ok(Duration::ZERO, "not json"),
                ScriptedGet::ok(Duration::ZERO, &board_json(7)),
            ],
        );
        let (events, mut rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend, events).start();

        assert!(matches!(
            rx.recv().await.unwrap(),
            GopherEvent::LeaderboardPollFailed { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            GopherEvent::LeaderboardPollFailed { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            GopherEvent::LeaderboardSnapshot(_)
        ));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_status_is_a_failed_poll() {
        let (backend, _posts) = MockBackend::scripted(
            vec![],
            vec![ScriptedGet {
                delay: Duration::ZERO,
                response: Ok(crate::http::HttpResponse {
                    status: 500,
                    body: "fatal error occurred getting top scores".into(),
                }),
            }],
        );
        let (events, mut rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend, events).start();

        match rx.recv().await.unwrap() {
            GopherEvent::LeaderboardPollFailed { reason } => assert!(reason.contains("500")),
            other => panic!("expected poll failure, got {other:?}"),
        }

        handle.stop().await;
    }

    /// A slow first response overtakes two later ones when fetches overlap.
    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_can_render_out_of_order() {
        let (backend, _posts) = MockBackend::scripted(
            vec![],
            vec![
                ScriptedGet::ok(Duration::from_millis(2500), &board_json(1)),
                ScriptedGet::ok(Duration::from_millis(100), &board_json(2)),
                ScriptedGet::ok(Duration::from_millis(100), &board_json(3)),
            ],
        );
        let (events, mut rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend.clone(), events)
            .with_overlap(OverlapPolicy::Concurrent)
            .start();

        tokio::time::sleep(Duration::from_millis(3600)).await;
        handle.stop().await;

        assert_eq!(backend.get_count(), 3);
        assert_eq!(snapshot_values(&mut rx), vec![2.0, 3.0, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_guard_skips_overlapping_ticks() {
        let (backend, _posts) = MockBackend::scripted(
            vec![],
            vec![
                ScriptedGet::ok(Duration::from_millis(2500), &board_json(1)),
                ScriptedGet::ok(Duration::from_millis(100), &board_json(2)),
            ],
        );
        let (events, mut rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend.clone(), events)
            .with_overlap(OverlapPolicy::SkipWhileInFlight)
            .start();

        // Ticks at 1000 (fetch), 2000 and 3000 (skipped), 4000 (fetch).
        tokio::time::sleep(Duration::from_millis(4500)).await;
        handle.stop().await;

        assert_eq!(backend.get_count(), 2);
        assert_eq!(snapshot_values(&mut rx), vec![1.0, 2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_polling() {
        let (backend, _posts) = MockBackend::new();
        let (events, _rx) = EventSender::channel(64);
        let mut handle = LeaderboardPoller::new(backend.clone(), events)
            .with_interval(Duration::from_millis(100))
            .start();
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.stop().await;
        assert!(!handle.is_running());

        let polled = backend.get_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.get_count(), polled);
    }
}
