//! Chat segments over `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries one connection segment of the chat
//! channel; [`WebSocketConnector`] dials new ones for the reconnect loop.
//! Both `ws://` and `wss://` endpoints work. TLS is rustls with the
//! webpki root store; rustls needs a crypto provider, which the default
//! feature set gets through `reqwest`. A build with `transport-websocket`
//! alone must install one before dialing `wss://`.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), feed_the_gopher_client::GopherError> {
//! use feed_the_gopher_client::{Transport, WebSocketTransport};
//!
//! let mut segment = WebSocketTransport::connect("ws://localhost:8080/connect").await?;
//! while let Some(Ok(fragment)) = segment.recv().await {
//!     println!("{fragment}");
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

use crate::error::GopherError;
use crate::transport::{Connector, Transport};

/// The stream a dialed segment runs on.
pub type ChatStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What one incoming frame means for the chat segment.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Fragment(String),
    Skip,
    End,
}

fn classify(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Fragment(text.to_string()),
        Message::Close(frame) => {
            match frame {
                Some(frame) => debug!(
                    code = u16::from(frame.code),
                    reason = frame.reason.as_str(),
                    "server closed chat segment"
                ),
                None => debug!("server closed chat segment"),
            }
            Frame::End
        }
        // Chat broadcasts are always text.
        Message::Binary(bytes) => {
            debug!(len = bytes.len(), "ignoring binary frame on chat segment");
            Frame::Skip
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
            trace!("control frame");
            Frame::Skip
        }
    }
}

/// A [`Transport`] over one WebSocket connection.
///
/// Each text frame is one chat fragment, handed over as received. The
/// server never expects anything from the client on this connection, so
/// the transport only reads; tungstenite answers pings itself.
///
/// [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: ChatStream,
    finished: bool,
}

impl WebSocketTransport {
    /// Dial `url` and complete the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Connect`] if the URL is malformed, the host is
    /// unreachable or the handshake is refused.
    pub async fn connect(url: &str) -> Result<Self, GopherError> {
        debug!(url = %url, "dialing chat channel");
        let (stream, response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| GopherError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        info!(url = %url, status = response.status().as_u16(), "chat segment open");
        Ok(Self::from_stream(stream))
    }

    /// [`connect`](Self::connect) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Timeout`] when the deadline passes first,
    /// otherwise whatever [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, GopherError> {
        match tokio::time::timeout(timeout, Self::connect(url)).await {
            Ok(dialed) => dialed,
            Err(_) => {
                debug!(url = %url, ?timeout, "chat dial timed out");
                Err(GopherError::Timeout)
            }
        }
    }

    /// Use a stream that was already upgraded elsewhere.
    pub fn from_stream(stream: ChatStream) -> Self {
        Self {
            stream,
            finished: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&mut self) -> Option<Result<String, GopherError>> {
        while !self.finished {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(GopherError::TransportReceive(e.to_string())));
                }
            };
            match classify(message) {
                Frame::Fragment(fragment) => return Some(Ok(fragment)),
                Frame::Skip => {}
                Frame::End => self.finished = true,
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), GopherError> {
        let already_finished = std::mem::replace(&mut self.finished, true);
        if already_finished {
            return Ok(());
        }
        self.stream
            .close(None)
            .await
            .map_err(|e| GopherError::TransportClose(e.to_string()))
    }
}

/// Dials [`WebSocketTransport`] segments for the chat channel loop.
///
/// Without a connect timeout a hung dial lasts as long as the operating
/// system allows.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on any single dial after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, GopherError> {
        let segment = match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(url, timeout).await?,
            None => WebSocketTransport::connect(url).await?,
        };
        Ok(Box::new(segment))
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
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    /// Serve one chat segment: push `frames` in order, then close.
    async fn serve_segment(frames: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for frame in frames {
                ws.send(frame).await.unwrap();
            }
            ws.close(None).await.unwrap();
            // Drain until the client finishes the close handshake.
            while let Some(Ok(_)) = ws.next().await {}
        });
        format!("ws://{addr}/connect")
    }

    /// Accept one segment and read from it until the client leaves.
    async fn serve_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });
        format!("ws://{addr}/connect")
    }

    #[test]
    fn classify_text_is_a_fragment() {
        assert_eq!(
            classify(Message::Text("<p>Ava: hi</p>".into())),
            Frame::Fragment("<p>Ava: hi</p>".into())
        );
    }

    #[test]
    fn classify_close_ends_the_segment() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "server restarting".into(),
        };
        assert_eq!(classify(Message::Close(Some(frame))), Frame::End);
        assert_eq!(classify(Message::Close(None)), Frame::End);
    }

    #[test]
    fn classify_skips_non_chat_frames() {
        assert_eq!(classify(Message::Binary(vec![1, 2].into())), Frame::Skip);
        assert_eq!(classify(Message::Ping(Default::default())), Frame::Skip);
        assert_eq!(classify(Message::Pong(Default::default())), Frame::Skip);
    }

    #[tokio::test]
    async fn malformed_url_is_a_connect_error() {
        let err = WebSocketTransport::connect("localhost:8080/connect")
            .await
            .unwrap_err();
        assert!(matches!(err, GopherError::Connect { .. }));
    }

    #[tokio::test]
    async fn refused_dial_names_the_endpoint() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/connect")
            .await
            .unwrap_err();
        match err {
            GopherError::Connect { url, .. } => assert_eq!(url, "ws://127.0.0.1:1/connect"),
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_dial_times_out() {
        // TEST-NET-1, never routed.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:8080/connect",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GopherError::Timeout));
    }

    #[tokio::test]
    async fn segment_delivers_broadcasts_in_order_then_ends() {
        let url = serve_segment(vec![
            Message::Text("Ava: hi".into()),
            Message::Binary(vec![0xFF].into()),
            Message::Text("Bo: <b>hey</b>".into()),
        ])
        .await;

        let mut segment = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(segment.recv().await.unwrap().unwrap(), "Ava: hi");
        assert_eq!(segment.recv().await.unwrap().unwrap(), "Bo: <b>hey</b>");
        assert!(segment.recv().await.is_none());
        // Stays ended.
        assert!(segment.recv().await.is_none());
    }

    #[tokio::test]
    async fn closing_twice_is_harmless() {
        let url = serve_silent().await;
        let mut segment = WebSocketTransport::connect(&url).await.unwrap();
        segment.close().await.unwrap();
        segment.close().await.unwrap();
        assert!(segment.recv().await.is_none());
    }

    #[tokio::test]
    async fn connector_hands_out_boxed_segments() {
        let url = serve_segment(vec![Message::Text("welcome".into())]).await;
        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
        let mut segment = connector.connect(&url).await.unwrap();
        assert_eq!(segment.recv().await.unwrap().unwrap(), "welcome");
    }

    #[cfg(feature = "http-reqwest")]
    #[tokio::test]
    async fn wss_dial_runs_a_tls_handshake() {
        // Accepts TCP and hangs up, so the TLS handshake itself fails.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            drop(tcp);
        });

        let err = WebSocketTransport::connect(&format!("wss://{addr}/connect"))
            .await
            .unwrap_err();
        match err {
            GopherError::Connect { reason, .. } => {
                assert!(!reason.contains("not compiled in"), "no TLS support: {reason}");
            }
            other => panic!("expected Connect, got {other:?}"),
        }
    }
}
