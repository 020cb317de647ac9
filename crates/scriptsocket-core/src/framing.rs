//! Length-prefixed message framing
//!
//! ```text
//! +------------------+-------------------+
//! | Length (4 bytes) | Body (N bytes)    |
//! | (big-endian u32) |                   |
//! +------------------+-------------------+
//! ```
//!
//! The body is opaque here. A zero-length body is a valid frame.

use crate::error::FrameError;

/// Size of the length header
pub const HEADER_LEN: usize = 4;

/// Largest body accepted by default (16 MiB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prefix `payload` with its length.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental decoder that rebuilds frames from arbitrarily chunked input
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
        }
    }

    /// Append `chunk` and return every frame it completes, in order.
    ///
    /// Bytes belonging to an incomplete frame (including a split header)
    /// stay buffered until a later call completes them. A header announcing
    /// a body above the limit is an error; the stream cannot be resynced
    /// after that, so the caller should drop the connection.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut offset = 0;

        while self.buffer.len() - offset >= HEADER_LEN {
            let header = &self.buffer[offset..offset + HEADER_LEN];
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

            if len > self.max_frame_len {
                return Err(FrameError::TooLarge {
                    len,
                    max: self.max_frame_len,
                });
            }

            let end = offset + HEADER_LEN + len;
            if self.buffer.len() < end {
                break;
            }

            frames.push(self.buffer[offset + HEADER_LEN..end].to_vec());
            offset = end;
        }

        self.buffer.drain(..offset);
        Ok(frames)
    }

    /// Bytes received but not yet part of a complete frame
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}
