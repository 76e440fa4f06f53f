//! Hyper-based HTTP transport.
//!
//! [`HyperTransport`] wraps hyper_util's legacy client over a plaintext
//! [`HttpConnector`]. Connection-level channel options (TCP keep-alive) are
//! applied to the connector when the transport is built.

use std::time::Duration;

use bytes::Bytes;
use chanargs_core::ValidatedOptions;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::ClientError;

/// Request body type sent by the transport.
pub type TransportBody = Full<Bytes>;

type HyperClient = Client<HttpConnector, TransportBody>;

/// HTTP transport using hyper_util's legacy client.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a new transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Send an HTTP request and receive a response.
    pub async fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> Result<http::Response<Incoming>, ClientError> {
        self.client
            .request(request)
            .await
            .map_err(|e| ClientError::Transport(format!("request failed: {}", e)))
    }
}

/// Builder for [`HyperTransport`].
///
/// # Example
///
/// ```ignore
/// use chanargs_client::transport::HyperTransportBuilder;
/// use std::time::Duration;
///
/// let transport = HyperTransportBuilder::new()
///     .tcp_keepalive(Duration::from_secs(30))
///     .build();
/// ```
#[derive(Debug)]
pub struct HyperTransportBuilder {
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
    /// TCP keep-alive interval.
    tcp_keepalive: Option<Duration>,
    /// Whether to set `TCP_NODELAY` on new connections.
    nodelay: bool,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self {
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            tcp_keepalive: None,
            nodelay: true,
        }
    }

    /// Builder preconfigured from validated channel options.
    pub fn from_options(options: &ValidatedOptions) -> Self {
        let mut builder = Self::new();
        builder.tcp_keepalive = options.keepalive();
        builder
    }

    /// Set the connection pool idle timeout.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of idle connections per host.
    ///
    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    pub fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.tcp_keepalive = Some(interval);
        self
    }

    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Build the transport.
    pub fn build(self) -> HyperTransport {
        let mut connector = HttpConnector::new();
        connector.set_keepalive(self.tcp_keepalive);
        connector.set_nodelay(self.nodelay);

        let mut builder = Client::builder(TokioExecutor::new());

        // Required for pool_idle_timeout to work.
        builder.pool_timer(TokioTimer::new());

        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        HyperTransport {
            client: builder.build(connector),
        }
    }
}
