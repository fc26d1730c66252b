//! HTTP transports.
//!
//! A [`Transport`] delivers one request and hands back the response head as
//! soon as it arrives; the body streams afterwards. Redirects, cookies and
//! status assertions live above this layer.

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::{RawResponse, Request, Result};

mod curl;
pub use self::curl::CurlBackend;

/// Sends a single request without following redirects.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and resolve once the response head is available.
    fn execute(&self, request: Request) -> BoxFuture<'_, Result<RawResponse>>;
}

/// Connection and timeout settings of the default transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    dial_timeout: Duration,
    keep_alive: Duration,
    max_idle_connections: usize,
    idle_timeout: Duration,
    tls_handshake_timeout: Duration,
    request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
            max_idle_connections: 100,
            idle_timeout: Duration::from_secs(90),
            tls_handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl TransportConfig {
    /// Default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time allowed to establish a TCP connection.
    #[must_use]
    pub const fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// TCP keep-alive probe interval. Zero disables keep-alive probes.
    #[must_use]
    pub const fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Upper bound on idle connection handles kept for reuse.
    #[must_use]
    pub const fn max_idle_connections(mut self, max: usize) -> Self {
        self.max_idle_connections = max;
        self
    }

    /// How long an idle connection may wait before it is closed.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Time allowed for the TLS handshake of `https` requests.
    #[must_use]
    pub const fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.tls_handshake_timeout = timeout;
        self
    }

    /// Overall time allowed for a single exchange, body included. Zero
    /// disables the limit.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Configured dial timeout.
    #[must_use]
    pub const fn get_dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Configured keep-alive interval.
    #[must_use]
    pub const fn get_keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Configured idle pool size.
    #[must_use]
    pub const fn get_max_idle_connections(&self) -> usize {
        self.max_idle_connections
    }

    /// Configured idle timeout.
    #[must_use]
    pub const fn get_idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Configured TLS handshake timeout.
    #[must_use]
    pub const fn get_tls_handshake_timeout(&self) -> Duration {
        self.tls_handshake_timeout
    }

    /// Configured request timeout.
    #[must_use]
    pub const fn get_request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
