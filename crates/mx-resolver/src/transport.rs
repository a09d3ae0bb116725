//! Byte transport for repository access.
//!
//! [`Transport`] is the seam between the resolver and the network. The
//! production implementation speaks HTTP(S) and reads `file://` URLs from
//! disk; [`MemoryTransport`] serves a scripted repository for tests and
//! benchmarks.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Error type for a single transport request.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {url}: {message}")]
    Read { url: String, message: String },
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout { .. } | TransportError::Connect { .. } => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Read { .. } => false,
        }
    }
}

/// Basic-auth credentials for a repository.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fetches raw bytes by URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url`. `Ok(None)` means the resource does not exist.
    async fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Vec<u8>>, TransportError>;
}

/// HTTP(S) and `file://` transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn read_file(url: &str, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::Read {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Self::read_file(url, path).await;
        }

        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            trace!("{} -> {}", url, status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| classify(url, e))?;
        Ok(Some(bytes.to_vec()))
    }
}

fn classify(url: &str, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

/// In-memory transport serving a fixed set of URLs.
///
/// Counts requests per URL and can fail the next N requests of a URL with a
/// scripted error.
#[derive(Default)]
pub struct MemoryTransport {
    files: DashMap<String, Vec<u8>>,
    failures: DashMap<String, VecDeque<TransportError>>,
    requests: DashMap<String, usize>,
    total: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.into(), bytes.into());
    }

    pub fn remove(&self, url: &str) {
        self.files.remove(url);
    }

    /// Fail the next `times` requests for `url` with `error`.
    pub fn fail_next(&self, url: impl Into<String>, times: usize, error: TransportError) {
        let mut queue = self.failures.entry(url.into()).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Number of requests made for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.get(url).map(|c| *c).unwrap_or(0)
    }

    /// Number of requests made for any URL.
    pub fn total_requests(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(
        &self,
        url: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        *self.requests.entry(url.to_string()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .failures
            .get_mut(url)
            .and_then(|mut queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        Ok(self.files.get(url).map(|bytes| bytes.clone()))
    }
}
