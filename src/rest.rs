//! One-shot REST fallback for the initial presence snapshot.
//!
//! The gateway handshake takes a round trip or two; [`RestFetcher`] lets the
//! UI paint an initial view from `GET {base}/v1/users/{subject_id}` while the
//! socket connects. The first streamed event frame supersedes whatever this
//! returns, so every failure here degrades to "no initial data" — logged,
//! never escalated.
//!
//! Only available when the `rest-fallback` feature is enabled (it is enabled
//! by default).

use serde::Deserialize;
use tracing::{debug, warn};

use crate::protocol::PresenceSnapshot;

/// REST response envelope: `{success, data}`.
#[derive(Deserialize, Debug)]
struct ApiResponse {
    success: bool,
    #[serde(default)]
    data: Option<PresenceSnapshot>,
}

/// One-shot fetcher for the current presence snapshot of a subject.
#[derive(Debug, Clone)]
pub struct RestFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl RestFetcher {
    /// Create a fetcher for the given service base URL
    /// (e.g. `https://presence.example.com`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a fetcher using a caller-supplied [`reqwest::Client`], for
    /// deployments that need custom TLS, proxies, or timeouts.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    /// Fetch the current snapshot for `subject_id`.
    ///
    /// Returns `None` — never an error — on network failure, a non-success
    /// HTTP status, a `success: false` envelope, or a body that does not
    /// decode. The returned snapshot is raw wire data; normalize it before
    /// handing it to the projector (the projector also normalizes
    /// defensively).
    pub async fn fetch(&self, subject_id: &str) -> Option<PresenceSnapshot> {
        let url = format!("{}/v1/users/{}", self.base_url, subject_id);
        debug!(url = %url, "fetching initial presence snapshot");

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("presence fallback fetch failed: {e}");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "presence fallback returned non-success status");
            return None;
        }

        let body: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("presence fallback returned undecodable body: {e}");
                return None;
            }
        };

        if body.success {
            body.data
        } else {
            debug!(subject_id, "presence fallback reported success=false");
            None
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP/1.1 response with the given status line and
    /// JSON body on an ephemeral port; returns the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Drain the request head.
            let mut buf = [0u8; 4096];
            let mut head = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                head.extend_from_slice(&buf[..n]);
                if n == 0 || head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len(),
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        format!("http://{addr}")
    }

    const SNAPSHOT_BODY: &str = r#"{
        "success": true,
        "data": {
            "subject_id": "U1",
            "status": "online",
            "activities": [],
            "profile": { "display_name": "Subject One" }
        }
    }"#;

    #[tokio::test]
    async fn fetch_returns_snapshot_on_success() {
        let base = serve_once("200 OK", SNAPSHOT_BODY).await;
        let fetcher = RestFetcher::new(base);

        let snapshot = fetcher.fetch("U1").await.unwrap();
        assert_eq!(snapshot.subject_id, "U1");
        assert_eq!(snapshot.profile.display_name, "Subject One");
        assert!(snapshot.music_session.is_none());
    }

    #[tokio::test]
    async fn fetch_swallows_connection_errors() {
        // Nothing listens on this port.
        let fetcher = RestFetcher::new("http://127.0.0.1:1");
        assert!(fetcher.fetch("U1").await.is_none());
    }

    #[tokio::test]
    async fn fetch_swallows_non_success_status() {
        let base = serve_once("404 Not Found", r#"{"success":false}"#).await;
        let fetcher = RestFetcher::new(base);
        assert!(fetcher.fetch("U1").await.is_none());
    }

    #[tokio::test]
    async fn fetch_swallows_success_false() {
        let base = serve_once("200 OK", r#"{"success":false,"data":null}"#).await;
        let fetcher = RestFetcher::new(base);
        assert!(fetcher.fetch("U1").await.is_none());
    }

    #[tokio::test]
    async fn fetch_swallows_undecodable_body() {
        let base = serve_once("200 OK", "this is not json").await;
        let fetcher = RestFetcher::new(base);
        assert!(fetcher.fetch("U1").await.is_none());
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let fetcher = RestFetcher::new("https://presence.example.com///");
        assert_eq!(fetcher.base_url, "https://presence.example.com");
    }
}
