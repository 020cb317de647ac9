//! Error types for scriptsocket
//!
//! Bind, client and staging errors are returned to the caller so a front end
//! can show them to the operator. Socket faults inside an active server
//! session never escape: the server logs them, closes that session and keeps
//! listening.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Wire Errors
// ----------------------------------------------------------------------------

/// Errors raised while splitting a byte stream into frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}

/// Errors raised while interpreting a frame body as a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Message body is empty")]
    Empty,
    #[error("Unknown message kind {0:#04x}")]
    UnknownKind(u8),
    #[error("Message text is not valid UTF-8")]
    InvalidUtf8,
}

// ----------------------------------------------------------------------------
// Server Errors
// ----------------------------------------------------------------------------

/// Failure to bring the server up
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Port {port} is already in use, choose another port")]
    PortInUse { port: u16 },
    #[error("Invalid port {value}: expected a value between 0 and 65535")]
    InvalidPort { value: i64 },
    #[error("Server is already listening on {addr}")]
    AlreadyListening { addr: std::net::SocketAddr },
    #[error("Failed to listen on port {port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Errors from a single TCP session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session is closed")]
    SessionClosed,
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("Socket error: {0}")]
    Io(#[from] io::Error),
}

// ----------------------------------------------------------------------------
// Client Errors
// ----------------------------------------------------------------------------

/// Failure of an outbound exchange
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection refused by {addr}: nothing is listening there")]
    ConnectionRefused { addr: String },
    #[error("No response from {addr} within {}ms", .timeout.as_millis())]
    ConnectionTimeout { addr: String, timeout: Duration },
    #[error("Connection to {addr} closed before an acknowledgment arrived")]
    ConnectionClosed { addr: String },
    #[error("Failed to send to {addr}: {source}")]
    SendFailure {
        addr: String,
        #[source]
        source: SessionError,
    },
    #[error("Failed to read reply from {addr}: {source}")]
    ReceiveFailure {
        addr: String,
        #[source]
        source: SessionError,
    },
    #[error("Could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Nothing to send: the selected content is empty")]
    EmptyPayload,
    #[error("Failed to obtain content to send: {0}")]
    Content(#[source] io::Error),
}

// ----------------------------------------------------------------------------
// Staging Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Failed to write staged payload to {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
