//! [`HttpBackend`] implementation using `reqwest`.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::{join_url, normalize_base_url};
use crate::error::GopherError;
use crate::http::{HttpBackend, HttpResponse};

/// An [`HttpBackend`] backed by a shared [`reqwest::Client`].
///
/// No request timeout is set: a request the server never answers simply
/// never completes, as with the browser client.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestBackend {
    /// Backend for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::InvalidBaseUrl`] unless `base_url` is an
    /// http(s) origin.
    pub fn new(base_url: &str) -> Result<Self, GopherError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Backend reusing an existing client (custom TLS, proxies, headers).
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::InvalidBaseUrl`] unless `base_url` is an
    /// http(s) origin.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, GopherError> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn post_json(&self, path: &str, body: String) -> Result<u16, GopherError> {
        let response = self
            .client
            .post(self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GopherError::Http(e.to_string()))?;
        Ok(response.status().as_u16())
    }

    async fn get(&self, path: &str) -> Result<HttpResponse, GopherError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| GopherError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GopherError::Http(e.to_string()))?;
        Ok(HttpResponse { status, body })
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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, capture the raw request, answer with
    /// `status_line` and `body`.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request_complete(&request) {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(request).unwrap()
        });

        (format!("http://{addr}"), task)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= head_end + 4 + content_length
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = ReqwestBackend::new("ws://localhost:8080").unwrap_err();
        assert!(matches!(err, GopherError::InvalidBaseUrl(_)));
    }

    #[tokio::test]
    async fn post_json_sends_body_and_returns_status() {
        let (base_url, server) = serve_once("429 Too Many Requests", "rate-limit exceeded").await;
        let backend = ReqwestBackend::new(&base_url).unwrap();

        let status = backend
            .post_json("/register-hit", r#"{"user":"Ava"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(status, 429);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /register-hit HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"user":"Ava"}"#));
    }

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let body = r#"{"elements":[{"rank":1,"name":"Ava","value":42}]}"#;
        let (base_url, server) = serve_once("200 OK", body).await;
        let backend = ReqwestBackend::new(&base_url).unwrap();

        let response = backend.get("/top-scorers").await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.body, body);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /top-scorers HTTP/1.1"));
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let backend = ReqwestBackend::new("http://127.0.0.1:1").unwrap();
        let err = backend.post_json("/send-message", "{}".into()).await.unwrap_err();
        assert!(matches!(err, GopherError::Http(_)));
    }
}
