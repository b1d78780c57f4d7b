//! Transport fetcher.
//!
//! Fetches the raw bytes behind a URL. Checks for network connectivity
//! before opening anything, and refuses responses that were served from a
//! different host than the one requested unless redirects are allowed.
//! Connections are owned values: every exit path drops them, which closes
//! the underlying socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::debug;

use super::error::{RetrievalError, RetrievalErrorKind};

/// Reports whether the device currently has a usable network.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Connectivity source for hosts that do not track network state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeConnected;

impl Connectivity for AssumeConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Connectivity flag updated by the host platform.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
    pub fn new(connected: bool) -> Self {
        Self(Arc::new(AtomicBool::new(connected)))
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An open connection whose response headers have arrived.
#[async_trait]
pub trait Connection: Send {
    /// The URL the response was actually served from, after any redirects.
    fn resolved_url(&self) -> &Url;

    /// Read the full response body.
    async fn read_body(&mut self) -> Result<Bytes, RetrievalError>;
}

/// Opens connections. Separated from [`HttpFetcher`] so tests can observe
/// whether a connection was ever attempted.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Connection>, RetrievalError>;
}

/// Fetches raw bytes for a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, allow_redirects: bool) -> Result<Bytes, RetrievalError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, RetrievalError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

struct ReqwestConnection {
    url: Url,
    response: Option<reqwest::Response>,
}

#[async_trait]
impl Connection for ReqwestConnection {
    fn resolved_url(&self) -> &Url {
        &self.url
    }

    async fn read_body(&mut self) -> Result<Bytes, RetrievalError> {
        let response = self
            .response
            .take()
            .ok_or_else(|| RetrievalError::new(RetrievalErrorKind::Unknown))?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Connection>, RetrievalError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        // Fault payloads from the tracker API arrive with a 200, so anything
        // else is a transport-level failure.
        if !status.is_success() {
            return Err(RetrievalError::new(RetrievalErrorKind::from_status(status)));
        }

        Ok(Box::new(ReqwestConnection {
            url: response.url().clone(),
            response: Some(response),
        }))
    }
}

/// The fetcher used against the live API.
pub struct HttpFetcher<T = ReqwestTransport> {
    transport: T,
    connectivity: Arc<dyn Connectivity>,
}

impl<T: Transport> HttpFetcher<T> {
    pub fn new(transport: T, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            transport,
            connectivity,
        }
    }
}

#[async_trait]
impl<T: Transport> Fetcher for HttpFetcher<T> {
    async fn fetch(&self, url: &Url, allow_redirects: bool) -> Result<Bytes, RetrievalError> {
        if !self.connectivity.is_connected() {
            debug!(%url, "no connectivity, not opening a connection");
            return Err(RetrievalError::no_connectivity());
        }

        let mut conn = self.transport.open(url).await?;

        if !allow_redirects && conn.resolved_url().host_str() != url.host_str() {
            debug!(
                requested = ?url.host_str(),
                resolved = ?conn.resolved_url().host_str(),
                "response served from a different host"
            );
            return Err(RetrievalError::new(RetrievalErrorKind::RedirectHostMismatch));
        }

        conn.read_body().await
    }
}
