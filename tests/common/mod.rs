#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the Feed the Gopher client integration tests.
//!
//! Provides a channel-fed [`MockTransport`], a scripted [`MockConnector`]
//! and a recording [`MockBackend`] so whole sessions can run without a
//! server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use feed_the_gopher_client::{
    ActionKind, Connector, GopherError, HttpBackend, HttpResponse, PresentationSink, ScoreEntry,
    Transport,
};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// Feeds a chat segment from the test.
pub type SegmentFeed = mpsc::UnboundedSender<Result<String, GopherError>>;

/// A transport whose fragments are pushed by the test through a
/// [`SegmentFeed`]. Dropping the feed closes the segment cleanly.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, GopherError>>,
}

impl MockTransport {
    pub fn new() -> (Self, SegmentFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { incoming: rx }, tx)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&mut self) -> Option<Result<String, GopherError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), GopherError> {
        self.incoming.close();
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out scripted dial outcomes: `None` fails the dial, `Some` opens
/// the given transport. Once the script runs out every dial fails.
pub struct MockConnector {
    script: StdMutex<VecDeque<Option<MockTransport>>>,
    dials: AtomicUsize,
    pub urls: StdMutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(script: Vec<Option<MockTransport>>) -> Arc<Self> {
        Arc::new(Self {
            script: StdMutex::new(script.into()),
            dials: AtomicUsize::new(0),
            urls: StdMutex::new(Vec::new()),
        })
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GopherError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        match self.script.lock().unwrap().pop_front().flatten() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(GopherError::Connect {
                url: url.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

// ── MockBackend ─────────────────────────────────────────────────────

/// A POST the backend received, with the body parsed back to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPost {
    pub path: String,
    pub body: serde_json::Value,
}

/// Records POSTs and answers from scripts. Unscripted POSTs answer 200;
/// unscripted GETs answer an empty leaderboard.
pub struct MockBackend {
    posts: mpsc::UnboundedSender<RecordedPost>,
    post_statuses: StdMutex<VecDeque<u16>>,
    boards: StdMutex<VecDeque<String>>,
    gets: AtomicUsize,
}

impl MockBackend {
    pub fn new(
        post_statuses: Vec<u16>,
        boards: Vec<&str>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedPost>) {
        let (posts, rx) = mpsc::unbounded_channel();
        let backend = Arc::new(Self {
            posts,
            post_statuses: StdMutex::new(post_statuses.into()),
            boards: StdMutex::new(boards.into_iter().map(String::from).collect()),
            gets: AtomicUsize::new(0),
        });
        (backend, rx)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn post_json(&self, path: &str, body: String) -> Result<u16, GopherError> {
        let body = serde_json::from_str(&body)?;
        self.posts
            .send(RecordedPost {
                path: path.to_string(),
                body,
            })
            .unwrap();
        Ok(self.post_statuses.lock().unwrap().pop_front().unwrap_or(200))
    }

    async fn get(&self, _path: &str) -> Result<HttpResponse, GopherError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let body = self
            .boards
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| r#"{"elements":null}"#.to_string());
        Ok(HttpResponse { status: 200, body })
    }
}

// ── Recording sink ──────────────────────────────────────────────────

/// A [`PresentationSink`] that keeps everything it was asked to render.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub chat_log: Vec<String>,
    pub board: Vec<ScoreEntry>,
    pub board_replacements: usize,
    pub notices: Vec<ActionKind>,
}

impl PresentationSink for RecordingSink {
    fn on_chat_fragment(&mut self, html: &str) {
        self.chat_log.push(html.to_string());
    }

    fn on_leaderboard_snapshot(&mut self, entries: &[ScoreEntry]) {
        self.board = entries.to_vec();
        self.board_replacements += 1;
    }

    fn on_rate_limited(&mut self, action: ActionKind) {
        self.notices.push(action);
    }
}
