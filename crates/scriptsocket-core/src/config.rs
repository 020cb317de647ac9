//! Core configuration for the server and outbound clients

use std::time::Duration;

use crate::error::BindError;
use crate::framing::MAX_FRAME_LEN;

/// Port used when settings do not name one
pub const DEFAULT_PORT: u16 = 54321;

/// Peer contacted by outbound clients by default
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Interface the server listens on by default
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// How long an outbound client waits to connect and for a reply
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for in-flight writes when a session closes
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Check a port number coming from settings or a command line.
///
/// `0` is accepted and asks the OS for any free port.
pub fn validate_port(value: i64) -> Result<u16, BindError> {
    u16::try_from(value).map_err(|_| BindError::InvalidPort { value })
}

/// Server-side settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind, e.g. `0.0.0.0` or `127.0.0.1`
    pub bind_host: String,
    /// Bounded wait for a closing session to finish writing
    pub flush_timeout: Duration,
    /// Largest frame body accepted from a peer
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }
}

/// Settings shared by the test and send clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port` for display, IPv6 literals bracketed
    pub fn addr(&self) -> String {
        crate::client::display_addr(&self.host, self.port)
    }
}
