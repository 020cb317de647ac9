//! Outbound clients
//!
//! Each exchange opens its own session, sends exactly one message, waits for
//! a reply and closes the session on every exit path.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, SessionError};
use crate::message::Message;
use crate::session::{Direction, Session};

// ----------------------------------------------------------------------------
// Content Provider
// ----------------------------------------------------------------------------

/// Source of the text the send client transmits, typically the host
/// application's current selection serialized to text.
///
/// Implementations may block; [`SendClient::send`] calls them on the
/// blocking pool.
pub trait ContentProvider: Send + Sync {
    /// May return an empty string when nothing is selected
    fn selected_content(&self) -> io::Result<String>;
}

/// Provider backed by a fixed string
#[derive(Debug, Clone, Default)]
pub struct StaticContent(pub String);

impl StaticContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl ContentProvider for StaticContent {
    fn selected_content(&self) -> io::Result<String> {
        Ok(self.0.clone())
    }
}

// ----------------------------------------------------------------------------
// Exchange
// ----------------------------------------------------------------------------

/// Reply received for a sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Raw body of the reply frame
    pub reply: Vec<u8>,
    /// Time from starting the connect to receiving the reply
    pub round_trip: Duration,
}

impl Ack {
    /// The reply as a message, if it parses as one
    pub fn message(&self) -> Option<Message> {
        Message::from_bytes(&self.reply).ok()
    }
}

/// Connect to `host:port`, send `message` and wait up to `timeout` for any
/// reply.
///
/// `timeout` bounds the connect and the wait for a reply separately. A peer
/// that closes the connection without replying yields
/// [`ClientError::ConnectionClosed`] as soon as the close is seen.
#[instrument(skip(message), fields(kind = ?message.kind()))]
pub async fn connect_and_send(
    host: &str,
    port: u16,
    message: &Message,
    timeout: Duration,
) -> Result<Ack, ClientError> {
    let addr = display_addr(host, port);
    let started = Instant::now();

    let mut session = open_session(host, port, &addr, timeout).await?;
    let outcome = exchange(&mut session, &addr, message, timeout, started).await;
    session.close().await;

    if let Ok(ack) = &outcome {
        debug!(%addr, round_trip_ms = ack.round_trip.as_millis() as u64, "Acknowledged");
    }
    outcome
}

/// `host:port`, with IPv6 literals bracketed
pub(crate) fn display_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

async fn open_session(
    host: &str,
    port: u16,
    addr: &str,
    timeout: Duration,
) -> Result<Session, ClientError> {
    // Bracketed literals are for display only; the resolver wants them bare.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Err(_) => {
            return Err(ClientError::ConnectionTimeout {
                addr: addr.to_string(),
                timeout,
            })
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            return Err(ClientError::ConnectionRefused {
                addr: addr.to_string(),
            })
        }
        Ok(Err(source)) => {
            return Err(ClientError::Connect {
                addr: addr.to_string(),
                source,
            })
        }
        Ok(Ok(stream)) => stream,
    };

    Session::new(stream, Direction::Outbound).map_err(|source| ClientError::Connect {
        addr: addr.to_string(),
        source,
    })
}

async fn exchange(
    session: &mut Session,
    addr: &str,
    message: &Message,
    timeout: Duration,
    started: Instant,
) -> Result<Ack, ClientError> {
    session
        .send_message(message)
        .await
        .map_err(|source| ClientError::SendFailure {
            addr: addr.to_string(),
            source,
        })?;

    match tokio::time::timeout(timeout, session.recv()).await {
        Err(_) => Err(ClientError::ConnectionTimeout {
            addr: addr.to_string(),
            timeout,
        }),
        Ok(Ok(Some(reply))) => Ok(Ack {
            reply,
            round_trip: started.elapsed(),
        }),
        Ok(Ok(None)) => Err(ClientError::ConnectionClosed {
            addr: addr.to_string(),
        }),
        Ok(Err(SessionError::Io(e))) if is_peer_gone(&e) => Err(ClientError::ConnectionClosed {
            addr: addr.to_string(),
        }),
        Ok(Err(source)) => Err(ClientError::ReceiveFailure {
            addr: addr.to_string(),
            source,
        }),
    }
}

fn is_peer_gone(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

// ----------------------------------------------------------------------------
// Clients
// ----------------------------------------------------------------------------

/// Sends the fixed test marker to check that a server is reachable
#[derive(Debug, Clone, Default)]
pub struct TestClient {
    config: ClientConfig,
}

impl TestClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn send(&self) -> Result<Ack, ClientError> {
        info!(addr = %self.config.addr(), "Sending test message");
        connect_and_send(
            &self.config.host,
            self.config.port,
            &Message::Test,
            self.config.timeout,
        )
        .await
    }
}

/// Sends the host application's selected content
#[derive(Debug, Clone, Default)]
pub struct SendClient {
    config: ClientConfig,
}

impl SendClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask `provider` for the selection and send it
    pub async fn send(&self, provider: Arc<dyn ContentProvider>) -> Result<Ack, ClientError> {
        let text = tokio::task::spawn_blocking(move || provider.selected_content())
            .await
            .map_err(|e| ClientError::Content(io::Error::new(io::ErrorKind::Other, e)))?
            .map_err(ClientError::Content)?;
        self.send_text(text).await
    }

    /// Send `text` as content. Empty text fails without connecting.
    pub async fn send_text(&self, text: String) -> Result<Ack, ClientError> {
        if text.is_empty() {
            return Err(ClientError::EmptyPayload);
        }

        info!(addr = %self.config.addr(), len = text.len(), "Sending content");
        connect_and_send(
            &self.config.host,
            self.config.port,
            &Message::Content(text),
            self.config.timeout,
        )
        .await
    }
}
