//! Error types for the Feed the Gopher client.

use thiserror::Error;

/// Errors that can occur inside the Feed the Gopher client.
///
/// None of these cross a component boundary as a fault: the channel loop
/// turns them into reconnects, the gateway and poller turn them into
/// events. They surface directly only from constructors and the identity
/// prompt.
#[derive(Debug, Error)]
pub enum GopherError {
    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// Failed to close the transport.
    #[error("transport close error: {0}")]
    TransportClose(String),

    /// Dialing the persistent channel endpoint failed.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying failure, rendered as text.
        reason: String,
    },

    /// A request/response call failed before any status was received.
    #[error("http request failed: {0}")]
    Http(String),

    /// The server answered with a status the caller cannot use.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// The configured base URL is not an `http://` or `https://` URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// A display name must not be empty.
    #[error("display name must not be empty")]
    EmptyName,

    /// The name prompt has no more input to offer (e.g. stdin reached EOF).
    #[error("name prompt closed before a name was entered")]
    PromptClosed,

    /// Failed to serialize or deserialize a wire message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Feed the Gopher client operations.
pub type Result<T> = std::result::Result<T, GopherError>;
