//! Client configuration.
//!
//! # Example
//!
//! ```
//! use feed_the_gopher_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("http://localhost:8080/")
//!     .unwrap()
//!     .with_poll_interval(Duration::from_millis(500));
//! assert_eq!(config.connect_url(), "ws://localhost:8080/connect");
//! assert_eq!(config.endpoint("/top-scorers"), "http://localhost:8080/top-scorers");
//! ```

use std::time::Duration;

use crate::channel::DEFAULT_RECONNECT_INTERVAL;
use crate::error::{GopherError, Result};
use crate::poller::{OverlapPolicy, DEFAULT_POLL_INTERVAL};
use crate::protocol::CONNECT_PATH;

/// Game server address used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Environment variable read by [`ClientConfig::from_env`].
pub const BASE_URL_ENV: &str = "GOPHER_BASE_URL";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `http://` or `https://` origin of the game server, without a
    /// trailing slash.
    pub base_url: String,
    /// Delay between a lost chat segment and the next dial.
    ///
    /// Defaults to **3000 ms**.
    pub reconnect_interval: Duration,
    /// Leaderboard refresh period.
    ///
    /// Defaults to **1000 ms**. Values below 1 ms are clamped to 1 ms.
    pub poll_interval: Duration,
    /// What the poller does when a tick fires while a fetch is still running.
    pub poll_overlap: OverlapPolicy,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped with a warning
    /// so no background loop ever blocks. Defaults to **256**. Values below
    /// 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long shutdown waits for the chat channel to close gracefully.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for the server at `base_url` with default timings.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::InvalidBaseUrl`] unless `base_url` starts with
    /// `http://` or `https://` and names a host.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_overlap: OverlapPolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }

    /// Configuration for the server named by `GOPHER_BASE_URL`, falling
    /// back to `http://localhost:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::InvalidBaseUrl`] if the variable is set to
    /// something that is not an http(s) URL.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(&base_url)
    }

    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the leaderboard refresh period. Clamped to at least 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_poll_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.poll_overlap = overlap;
        self
    }

    /// Set the capacity of the bounded event channel. Clamped to at least 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Full URL of an HTTP endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// WebSocket URL of the chat channel on the same host and port.
    pub fn connect_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        join_url(&ws_base, CONNECT_PATH)
    }
}

/// Validate an http(s) origin and strip trailing slashes.
pub(crate) fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"));
    match host {
        Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(GopherError::InvalidBaseUrl(base_url.to_string())),
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
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

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("http://localhost:8080").unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.reconnect_interval, Duration::from_millis(3000));
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.poll_overlap, OverlapPolicy::Concurrent);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = ClientConfig::new("http://localhost:8080")
            .unwrap()
            .with_reconnect_interval(Duration::from_secs(10))
            .with_poll_interval(Duration::from_millis(250))
            .with_poll_overlap(OverlapPolicy::SkipWhileInFlight)
            .with_event_channel_capacity(16)
            .with_shutdown_timeout(Duration::from_millis(50));
        assert_eq!(config.reconnect_interval, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_overlap, OverlapPolicy::SkipWhileInFlight);
        assert_eq!(config.event_channel_capacity, 16);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(50));
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let config = ClientConfig::new("http://localhost:8080")
            .unwrap()
            .with_poll_interval(Duration::ZERO)
            .with_event_channel_capacity(0);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn connect_url_follows_scheme() {
        let plain = ClientConfig::new("http://game.local:8080/").unwrap();
        assert_eq!(plain.connect_url(), "ws://game.local:8080/connect");

        let tls = ClientConfig::new("https://game.example").unwrap();
        assert_eq!(tls.connect_url(), "wss://game.example/connect");
    }

    #[test]
    fn endpoint_joins_paths() {
        let config = ClientConfig::new("http://localhost:8080//").unwrap();
        assert_eq!(
            config.endpoint("/register-hit"),
            "http://localhost:8080/register-hit"
        );
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        for bad in ["", "localhost:8080", "ws://localhost:8080", "http://", "https:///"] {
            assert!(
                matches!(ClientConfig::new(bad), Err(GopherError::InvalidBaseUrl(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
