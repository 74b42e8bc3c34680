//! Scripted [`HttpBackend`] shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::GopherError;
use crate::http::{HttpBackend, HttpResponse};

/// A POST the backend received.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedPost {
    pub path: String,
    pub body: serde_json::Value,
}

/// One scripted GET answer, delivered after `delay`.
pub(crate) struct ScriptedGet {
    pub delay: Duration,
    pub response: Result<HttpResponse, GopherError>,
}

impl ScriptedGet {
    pub fn ok(delay: Duration, body: &str) -> Self {
        Self {
            delay,
            response: Ok(HttpResponse {
                status: 200,
                body: body.to_string(),
            }),
        }
    }

    pub fn err(reason: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Err(GopherError::Http(reason.to_string())),
        }
    }
}

/// Records every POST on a channel and answers from per-verb scripts.
///
/// Unscripted POSTs answer 200; unscripted GETs answer an empty board.
pub(crate) struct MockBackend {
    posts: mpsc::UnboundedSender<RecordedPost>,
    post_script: StdMutex<VecDeque<Result<u16, GopherError>>>,
    get_script: StdMutex<VecDeque<ScriptedGet>>,
    gets: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedPost>) {
        Self::scripted(vec![], vec![])
    }

    pub fn scripted(
        post_script: Vec<Result<u16, GopherError>>,
        get_script: Vec<ScriptedGet>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedPost>) {
        let (posts, rx) = mpsc::unbounded_channel();
        let backend = Arc::new(Self {
            posts,
            post_script: StdMutex::new(post_script.into()),
            get_script: StdMutex::new(get_script.into()),
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
        let _ = self.posts.send(RecordedPost {
            path: path.to_string(),
            body,
        });
        let next = self.post_script.lock().map_or(None, |mut s| s.pop_front());
        next.unwrap_or(Ok(200))
    }

    async fn get(&self, _path: &str) -> Result<HttpResponse, GopherError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let next = self.get_script.lock().map_or(None, |mut s| s.pop_front());
        match next {
            Some(scripted) => {
                tokio::time::sleep(scripted.delay).await;
                scripted.response
            }
            None => Ok(HttpResponse {
                status: 200,
                body: r#"{"elements":null}"#.to_string(),
            }),
        }
    }
}
