//! A single framed TCP connection
//!
//! A [`Session`] owns its socket exclusively. The server owns inbound
//! sessions and the outbound clients own theirs; whichever owner drops or
//! closes a session releases the socket.
//!
//! ```text
//! Open --close()--> Closing --(flush done or timed out)--> Closed
//! ```

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use crate::config::DEFAULT_FLUSH_TIMEOUT;
use crate::error::SessionError;
use crate::framing::{self, FrameDecoder, MAX_FRAME_LEN};
use crate::message::Message;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by the server
    Inbound,
    /// Opened by an outbound client
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// Waiting for an in-flight write before releasing the socket
    Closing,
    Closed,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    direction: Direction,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    ready: VecDeque<Vec<u8>>,
    state: SessionState,
    flush_timeout: Duration,
}

impl Session {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream, direction: Direction) -> io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        // Frames are written whole; there is nothing to coalesce.
        stream.set_nodelay(true)?;

        Ok(Self {
            id: Uuid::new_v4(),
            direction,
            local_addr,
            peer_addr,
            stream: Some(stream),
            decoder: FrameDecoder::with_max_frame_len(MAX_FRAME_LEN),
            ready: VecDeque::new(),
            state: SessionState::Open,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        })
    }

    /// Open an outbound session to `addr`
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream, Direction::Outbound)
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.decoder = FrameDecoder::with_max_frame_len(len);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    fn open_stream(&mut self) -> Result<&mut TcpStream, SessionError> {
        match (self.state, self.stream.as_mut()) {
            (SessionState::Open, Some(stream)) => Ok(stream),
            _ => Err(SessionError::SessionClosed),
        }
    }

    /// Frame `payload` and write it out
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let frame = framing::encode(payload)?;
        let stream = self.open_stream()?;
        stream.write_all(&frame).await?;
        stream.flush().await?;
        debug!(session = %self.id, len = payload.len(), "Frame sent");
        Ok(())
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), SessionError> {
        self.send(&message.to_bytes()).await
    }

    /// Next complete frame body, or `None` once the peer has closed.
    ///
    /// Cancel safe: bytes are handed to the decoder in the same poll that
    /// reads them, so dropping this future between reads loses nothing.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let read = self.open_stream()?.read(&mut chunk).await?;
            if read == 0 {
                if !self.decoder.pending().is_empty() {
                    debug!(
                        session = %self.id,
                        pending = self.decoder.pending().len(),
                        "Peer closed mid-frame"
                    );
                }
                return Ok(None);
            }

            self.ready.extend(self.decoder.feed(&chunk[..read])?);
        }
    }

    /// Release the socket. Closing a closed session does nothing.
    ///
    /// Pending writes get up to the flush timeout to drain; the socket is
    /// dropped afterwards whether or not they made it.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            self.state = SessionState::Closed;
            return;
        };

        self.state = SessionState::Closing;
        match tokio::time::timeout(self.flush_timeout, stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(session = %self.id, error = %e, "Shutdown failed"),
            Err(_) => debug!(session = %self.id, "Flush timed out, dropping socket"),
        }
        drop(stream);

        self.state = SessionState::Closed;
        debug!(session = %self.id, peer = %self.peer_addr, "Session closed");
    }
}
