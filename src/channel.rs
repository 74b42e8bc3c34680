//! Reconnecting persistent channel for server-pushed chat broadcasts.
//!
//! [`ConnectionChannel::open`] spawns a background loop that dials the
//! endpoint, forwards every received fragment to a [`MessageHandler`], and
//! redials after a [`BackoffPolicy`] delay whenever the dial fails or the
//! segment drops. Failures are never surfaced to the caller; only an
//! explicit [`ChannelHandle::shutdown`] ends the loop.
//!
//! ```text
//!            dial ok               segment lost
//! Connecting ───────▶ Open ─────────────────────▶ Reconnecting
//!     ▲  │                                           │
//!     │  └──────────── dial failed ─────────────────▶│
//!     └───────────────── backoff elapsed ────────────┘
//!
//! any state ── shutdown ──▶ Closed
//! ```
//!
//! Delivery is at-most-once per segment. Fragments in flight while a
//! segment drops are lost; nothing is buffered or replayed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::transport::{Connector, Transport};

/// Delay between a lost segment (or failed dial) and the next dial.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── State ───────────────────────────────────────────────────────────

/// Lifecycle state of the chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A dial is in flight.
    Connecting,
    /// A segment is up and fragments are being delivered.
    Open,
    /// Waiting out the backoff before the next dial.
    Reconnecting,
    /// Shut down by the owner. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ── Backoff ─────────────────────────────────────────────────────────

/// Decides how long to wait before the next dial.
pub trait BackoffPolicy: Send + 'static {
    /// Delay before the next dial, where `attempt` counts consecutive
    /// failures (dial errors or dropped segments) starting at 1.
    fn delay(&mut self, attempt: u32) -> Duration;

    /// Called after every successful dial.
    fn reset(&mut self) {}
}

/// The same delay after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_INTERVAL)
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn delay(&mut self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// `initial * factor^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    factor: u32,
    max: Duration,
}

impl ExponentialBackoff {
    /// `factor` values below 1 are clamped to 1.
    pub fn new(initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            initial,
            factor: factor.max(1),
            max,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&mut self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(multiplier)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

// ── Message handler ─────────────────────────────────────────────────

/// Receives what the channel loop produces.
///
/// Fragments are handed over unmodified, once each, in the order the
/// segment delivered them.
pub trait MessageHandler: Send + 'static {
    /// A fragment arrived on the open segment.
    fn on_message(&mut self, raw: String);

    /// The channel moved to `state`.
    fn on_state(&mut self, _state: ConnectionState) {}
}

impl<F> MessageHandler for F
where
    F: FnMut(String) + Send + 'static,
{
    fn on_message(&mut self, raw: String) {
        self(raw);
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// Builder for the reconnecting chat channel.
///
/// # Example
///
/// ```rust,ignore
/// let handle = ConnectionChannel::new("ws://localhost:8080/connect")
///     .open(Arc::new(WebSocketConnector::new()), |raw: String| println!("{raw}"));
/// ```
pub struct ConnectionChannel {
    url: String,
    backoff: Box<dyn BackoffPolicy>,
    shutdown_timeout: Duration,
}

impl ConnectionChannel {
    /// A channel to `url` that redials every 3000 ms.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: Box::new(ConstantBackoff::default()),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Replace the redial policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: impl BackoffPolicy) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// How long [`ChannelHandle::shutdown`] waits for the loop before
    /// aborting it.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the channel loop. Must be called inside a tokio runtime.
    pub fn open(self, connector: Arc<dyn Connector>, handler: impl MessageHandler) -> ChannelHandle {
        let state_tx = Arc::new(watch::Sender::new(ConnectionState::Connecting));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(channel_loop(
            self.url,
            connector,
            self.backoff,
            handler,
            Arc::clone(&state_tx),
            shutdown_rx,
        ));

        ChannelHandle {
            state_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl fmt::Debug for ConnectionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionChannel")
            .field("url", &self.url)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Owner's handle on a running channel loop.
///
/// Dropping the handle aborts the loop without a close handshake.
pub struct ChannelHandle {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ChannelHandle {
    /// Current state of the channel.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Close the current segment and stop redialing.
    ///
    /// The channel is [`Closed`](ConnectionState::Closed) once this returns,
    /// and the handler has been told so, even when the loop had to be
    /// aborted after the shutdown timeout. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        debug!("chat channel: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("channel loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("channel loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("channel loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state_tx.send_replace(ConnectionState::Closed);
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("state", &self.state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Channel loop ────────────────────────────────────────────────────

/// How a connected segment ended.
enum SegmentEnd {
    Shutdown,
    Lost(Option<String>),
}

/// The handler and the published state, owned by the channel loop.
///
/// Dropping it reports [`ConnectionState::Closed`], so the handler hears
/// about the end of the loop even when the task is aborted.
struct LoopState<H: MessageHandler> {
    handler: H,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl<H: MessageHandler> LoopState<H> {
    fn transition(&mut self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "chat channel state");
            self.handler.on_state(next);
        }
    }
}

impl<H: MessageHandler> Drop for LoopState<H> {
    fn drop(&mut self) {
        self.transition(ConnectionState::Closed);
    }
}

async fn channel_loop(
    url: String,
    connector: Arc<dyn Connector>,
    mut backoff: Box<dyn BackoffPolicy>,
    handler: impl MessageHandler,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(url = %url, "channel loop started");
    let mut state = LoopState { handler, state_tx };
    let mut failures: u32 = 0;

    loop {
        state.transition(ConnectionState::Connecting);

        let dialed = tokio::select! {
            result = connector.connect(&url) => result,
            _ = &mut shutdown_rx => break,
        };

        match dialed {
            Ok(mut transport) => {
                failures = 0;
                backoff.reset();
                state.transition(ConnectionState::Open);

                match pump(transport.as_mut(), &mut state.handler, &mut shutdown_rx).await {
                    SegmentEnd::Shutdown => {
                        if let Err(e) = transport.close().await {
                            debug!("error closing chat segment: {e}");
                        }
                        break;
                    }
                    SegmentEnd::Lost(reason) => {
                        info!(
                            url = %url,
                            reason = reason.as_deref().unwrap_or("closed by server"),
                            "chat segment lost"
                        );
                    }
                }
            }
            Err(e) => {
                debug!(url = %url, "chat dial failed: {e}");
            }
        }

        failures = failures.saturating_add(1);
        let delay = backoff.delay(failures);
        state.transition(ConnectionState::Reconnecting);
        debug!(attempt = failures, ?delay, "scheduling redial");

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => break,
        }
    }

    // `state` drops here and reports Closed.
    debug!("channel loop exited");
}

/// Forward fragments from one segment until it ends or shutdown arrives.
async fn pump(
    transport: &mut dyn Transport,
    handler: &mut impl MessageHandler,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SegmentEnd {
    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => return SegmentEnd::Shutdown,
            incoming = transport.recv() => match incoming {
                Some(Ok(raw)) => handler.on_message(raw),
                Some(Err(e)) => return SegmentEnd::Lost(Some(e.to_string())),
                None => return SegmentEnd::Lost(None),
            },
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::GopherError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    // ── Mocks ───────────────────────────────────────────────────────

    /// Replays scripted fragments, then stays open forever. A stuck
    /// transport never finishes its close handshake.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String, GopherError>>>,
        stuck: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn recv(&mut self) -> Option<Result<String, GopherError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), GopherError> {
            if self.stuck {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    /// One scripted dial outcome.
    enum Dial {
        Fail,
        Segment(Vec<Option<Result<String, GopherError>>>),
        Stuck,
    }

    /// Hands out scripted dial outcomes and records when each dial happened.
    /// Once the script runs out, every dial fails.
    struct MockConnector {
        script: StdMutex<VecDeque<Dial>>,
        dials: Arc<StdMutex<Vec<Instant>>>,
    }

    impl MockConnector {
        fn new(script: Vec<Dial>) -> (Arc<Self>, Arc<StdMutex<Vec<Instant>>>) {
            let dials = Arc::new(StdMutex::new(Vec::new()));
            let connector = Arc::new(Self {
                script: StdMutex::new(script.into()),
                dials: Arc::clone(&dials),
            });
            (connector, dials)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GopherError> {
            self.dials.lock().unwrap().push(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Dial::Segment(incoming)) => Ok(Box::new(MockTransport {
                    incoming: incoming.into(),
                    stuck: false,
                })),
                Some(Dial::Stuck) => Ok(Box::new(MockTransport {
                    incoming: VecDeque::new(),
                    stuck: true,
                })),
                Some(Dial::Fail) | None => Err(GopherError::Connect {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    fn collecting_handler() -> (impl MessageHandler, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |raw: String| {
            let _ = tx.send(raw);
        };
        (handler, rx)
    }

    /// Records every state the handler is told about.
    struct Recorder(mpsc::UnboundedSender<ConnectionState>);

    impl MessageHandler for Recorder {
        fn on_message(&mut self, _raw: String) {}

        fn on_state(&mut self, state: ConnectionState) {
            let _ = self.0.send(state);
        }
    }

    async fn wait_for_state(handle: &ChannelHandle, wanted: ConnectionState) {
        let mut rx = handle.subscribe_state();
        rx.wait_for(|state| *state == wanted).await.unwrap();
    }

    // ── Backoff ─────────────────────────────────────────────────────

    #[test]
    fn constant_backoff_defaults_to_three_seconds() {
        let mut backoff = ConstantBackoff::default();
        assert_eq!(backoff.delay(1), Duration::from_millis(3000));
        assert_eq!(backoff.delay(50), Duration::from_millis(3000));
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(500), 2, Duration::from_secs(5));
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(2), Duration::from_millis(1000));
        assert_eq!(backoff.delay(4), Duration::from_millis(4000));
        assert_eq!(backoff.delay(5), Duration::from_secs(5));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(5));
    }

    // ── State machine ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn n_failed_dials_then_open_after_n_plus_one_attempts() {
        let (connector, dials) = MockConnector::new(vec![
            Dial::Fail,
            Dial::Fail,
            Dial::Fail,
            Dial::Segment(vec![]),
        ]);
        let (handler, _rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect").open(connector, handler);

        wait_for_state(&handle, ConnectionState::Open).await;

        {
            let dials = dials.lock().unwrap();
            assert_eq!(dials.len(), 4);
            for pair in dials.windows(2) {
                assert!(pair[1] - pair[0] >= DEFAULT_RECONNECT_INTERVAL);
            }
        }

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fragments_are_forwarded_once_in_order() {
        let (connector, _dials) = MockConnector::new(vec![Dial::Segment(vec![
            Some(Ok("<b>Ava</b>: hi".into())),
            Some(Ok("Bo: hey".into())),
            Some(Ok("Ava: hi".into())),
        ])]);
        let (handler, mut rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect").open(connector, handler);

        assert_eq!(rx.recv().await.unwrap(), "<b>Ava</b>: hi");
        assert_eq!(rx.recv().await.unwrap(), "Bo: hey");
        assert_eq!(rx.recv().await.unwrap(), "Ava: hi");

        handle.shutdown().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_segment_is_redialed_after_backoff() {
        let (connector, dials) = MockConnector::new(vec![
            Dial::Segment(vec![Some(Ok("first".into())), None]),
            Dial::Segment(vec![Some(Ok("second".into()))]),
        ]);
        let (handler, mut rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect").open(connector, handler);

        assert_eq!(rx.recv().await.unwrap(), "first");
        assert_eq!(rx.recv().await.unwrap(), "second");

        {
            let dials = dials.lock().unwrap();
            assert_eq!(dials.len(), 2);
            assert!(dials[1] - dials[0] >= DEFAULT_RECONNECT_INTERVAL);
        }
        assert_eq!(handle.state(), ConnectionState::Open);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_is_treated_like_a_drop() {
        let (connector, dials) = MockConnector::new(vec![
            Dial::Segment(vec![Some(Err(GopherError::TransportReceive("reset".into())))]),
            Dial::Segment(vec![Some(Ok("back".into()))]),
        ]);
        let (handler, mut rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect").open(connector, handler);

        assert_eq!(rx.recv().await.unwrap(), "back");
        assert_eq!(dials.lock().unwrap().len(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn custom_backoff_policy_is_used() {
        let (connector, dials) =
            MockConnector::new(vec![Dial::Fail, Dial::Fail, Dial::Segment(vec![])]);
        let (handler, _rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect")
            .with_backoff(ExponentialBackoff::new(
                Duration::from_millis(100),
                10,
                Duration::from_secs(60),
            ))
            .open(connector, handler);

        wait_for_state(&handle, ConnectionState::Open).await;

        {
            let dials = dials.lock().unwrap();
            assert_eq!(dials.len(), 3);
            assert!(dials[1] - dials[0] >= Duration::from_millis(100));
            assert!(dials[2] - dials[1] >= Duration::from_millis(1000));
        }

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_reconnecting_stops_dialing() {
        let (connector, dials) = MockConnector::new(vec![]);
        let (handler, _rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect").open(connector, handler);

        wait_for_state(&handle, ConnectionState::Reconnecting).await;
        handle.shutdown().await;
        assert_eq!(handle.state(), ConnectionState::Closed);

        let dialed = dials.lock().unwrap().len();
        tokio::time::sleep(DEFAULT_RECONNECT_INTERVAL * 5).await;
        assert_eq!(dials.lock().unwrap().len(), dialed);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_never_reach_closed() {
        let (connector, dials) = MockConnector::new(vec![]);
        let (handler, _rx) = collecting_handler();
        let mut handle = ConnectionChannel::new("ws://test/connect").open(connector, handler);

        tokio::time::sleep(DEFAULT_RECONNECT_INTERVAL * 10).await;
        assert_ne!(handle.state(), ConnectionState::Closed);
        assert!(dials.lock().unwrap().len() >= 10);

        handle.shutdown().await;
        // Idempotent.
        handle.shutdown().await;
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_sees_state_transitions() {
        let (connector, _dials) = MockConnector::new(vec![Dial::Fail, Dial::Segment(vec![])]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle =
            ConnectionChannel::new("ws://test/connect").open(connector, Recorder(tx));

        // Initial Connecting is the starting value, so the first reported
        // transition is the failed dial.
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Reconnecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Open);

        handle.shutdown().await;
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_sees_closed_when_shutdown_has_to_abort() {
        let (connector, _dials) = MockConnector::new(vec![Dial::Stuck]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = ConnectionChannel::new("ws://test/connect")
            .with_shutdown_timeout(Duration::from_millis(200))
            .open(connector, Recorder(tx));

        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Open);

        let started = Instant::now();
        handle.shutdown().await;
        assert!(started.elapsed() >= Duration::from_millis(200));

        assert_eq!(handle.state(), ConnectionState::Closed);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Closed);
        // The handler went away with the aborted loop.
        assert!(rx.recv().await.is_none());
    }
}
