//! HTTP probe - one request per tick, outcome reported verbatim

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{HchkError, Result};

/// Default request timeout; bounds how long a probe can hold up the loop
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    /// Response status line, or a failure description
    pub detail: String,
    /// Whether a response was received at all
    pub responded: bool,
}

impl ProbeOutcome {
    /// A response came back with the given status line
    pub fn status(success: bool, status_line: impl Into<String>) -> Self {
        Self {
            success,
            detail: status_line.into(),
            responded: true,
        }
    }

    /// The request failed before a response arrived
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: description.into(),
            responded: false,
        }
    }

    /// Log line for this outcome
    pub fn message(&self) -> String {
        if self.responded {
            format!("Healthcheck status='{}'", self.detail)
        } else {
            format!("Healthcheck err='{}'", self.detail)
        }
    }
}

/// Something that can check a target's liveness
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, url: &str) -> ProbeOutcome;
}

/// Plain GET against the target
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Create a probe with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT, concat!("hchk/", env!("CARGO_PKG_VERSION")))
    }

    /// Create a probe with an explicit timeout and user agent
    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| HchkError::HttpClient(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> ProbeOutcome {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                // body is dropped unread
                ProbeOutcome::status(status.is_success(), status.to_string())
            }
            Err(e) => ProbeOutcome::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the URL
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{}/health", addr)
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(
            ProbeOutcome::status(true, "200 OK").message(),
            "Healthcheck status='200 OK'"
        );
        assert_eq!(
            ProbeOutcome::failed("connection refused").message(),
            "Healthcheck err='connection refused'"
        );
    }

    #[test]
    fn test_failed_outcome_is_not_success() {
        let outcome = ProbeOutcome::failed("timeout");
        assert!(!outcome.success);
        assert!(!outcome.responded);
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let url = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok").await;
        let probe = HttpProbe::new().unwrap();
        let outcome = probe.check(&url).await;
        assert!(outcome.success);
        assert_eq!(outcome.detail, "200 OK");
    }

    #[tokio::test]
    async fn test_http_probe_non_success_status() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let probe = HttpProbe::new().unwrap();
        let outcome = probe.check(&url).await;
        assert!(!outcome.success);
        assert!(outcome.responded);
        assert_eq!(outcome.detail, "503 Service Unavailable");
    }

    #[tokio::test]
    async fn test_http_probe_connection_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::with_timeout(Duration::from_secs(5), "hchk-test").unwrap();
        let outcome = probe.check(&format!("http://{}/health", addr)).await;
        assert!(!outcome.success);
        assert!(!outcome.responded);
        assert!(!outcome.detail.is_empty());
    }
}
