//! Transport abstraction for the persistent chat channel.
//!
//! A [`Transport`] is one physical connection segment: it yields the text
//! fragments the server pushes until it ends. A [`Connector`] dials new
//! segments, which is what lets the [`channel`](crate::channel) loop
//! reconnect without knowing what the wire is.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use feed_the_gopher_client::error::GopherError;
//! use feed_the_gopher_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn recv(&mut self) -> Option<Result<String, GopherError>> {
//!         // Return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), GopherError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::GopherError;

/// One connection segment delivering server-pushed text fragments.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the channel
/// loop races it against the shutdown signal inside `tokio::select!`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Receive the next pushed fragment.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a fragment arrived
    /// - `Some(Err(e))`: the segment failed
    /// - `None`: the server closed the segment cleanly
    async fn recv(&mut self) -> Option<Result<String, GopherError>>;

    /// Close the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are
    /// released either way.
    async fn close(&mut self) -> Result<(), GopherError>;
}

/// Dials new [`Transport`] segments.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new segment to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Connect`] or [`GopherError::Timeout`] when the
    /// dial fails. The channel loop treats every error the same way.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GopherError>;
}
