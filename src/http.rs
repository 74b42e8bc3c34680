//! Request/response abstraction for the game's HTTP endpoints.
//!
//! The gateway and the poller only need two calls: post a JSON body and
//! read the status, or get a body. Keeping them behind [`HttpBackend`]
//! lets tests script the server and lets embedders bring their own client.
//! The default implementation is [`ReqwestBackend`](crate::backends::ReqwestBackend).

use async_trait::async_trait;

use crate::error::GopherError;

/// Status and body of a completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP client used by the gateway and the poller.
///
/// Paths are absolute (`/register-hit`); the backend owns the base URL.
/// Implementations must not impose a request timeout of their own unless
/// the embedder asked for one.
#[async_trait]
pub trait HttpBackend: Send + Sync + 'static {
    /// POST `body` as JSON to `path` and return the response status.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Http`] if no response was received at all.
    async fn post_json(&self, path: &str, body: String) -> Result<u16, GopherError>;

    /// GET `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Http`] if no response was received or the body
    /// could not be read.
    async fn get(&self, path: &str) -> Result<HttpResponse, GopherError>;
}
