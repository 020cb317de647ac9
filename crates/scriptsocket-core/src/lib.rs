//! scriptsocket core
//!
//! Exchanges script-like text payloads between a content-creation
//! application and a local or remote peer over TCP.
//!
//! - [`Server`] listens on a port, services one peer at a time and writes
//!   every received content payload to a [`StagingStore`] for the host
//!   application to pick up.
//! - [`TestClient`] and [`SendClient`] open a session, send one message and
//!   wait for the server's acknowledgment.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scriptsocket_core::{
//!     ClientConfig, SendClient, Server, ServerConfig, StagingStore, StaticContent, TracingLogSink,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let staging = Arc::new(StagingStore::process_scoped()?);
//!     let server = Server::new(ServerConfig::default(), staging, Arc::new(TracingLogSink));
//!     let handle = server.start(54321).await?;
//!
//!     let client = SendClient::new(ClientConfig::new("127.0.0.1", handle.port()));
//!     client.send(Arc::new(StaticContent::new("Blur { size 2 }"))).await?;
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! +------------------+-------------+------------------+
//! | Length (4 bytes) | Kind (1)    | UTF-8 text       |
//! | (big-endian u32) |             |                  |
//! +------------------+-------------+------------------+
//! ```
//!
//! The length counts the kind byte and the text. See [`framing`] and
//! [`message`].

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod log;
pub mod message;
pub mod server;
pub mod session;
pub mod staging;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::{connect_and_send, Ack, ContentProvider, SendClient, StaticContent, TestClient};
pub use config::{validate_port, ClientConfig, ServerConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use error::{BindError, ClientError, FrameError, MessageError, SessionError, StagingError};
pub use framing::FrameDecoder;
pub use log::{LogKind, LogSink, MemoryLogSink, TracingLogSink};
pub use message::{Message, MessageKind, ACK_MARKER, TEST_MARKER};
pub use server::{ListeningHandle, Server, ServerState};
pub use session::{Direction, Session, SessionState};
pub use staging::StagingStore;
