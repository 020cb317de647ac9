//! Message kinds carried inside frames
//!
//! Every frame body starts with a kind byte followed by UTF-8 text:
//!
//! | Kind | Byte   | Text                        |
//! |------|--------|-----------------------------|
//! | Test | `0x01` | [`TEST_MARKER`]             |
//! | Content | `0x02` | script payload           |
//! | Ack  | `0x03` | [`ACK_MARKER`]              |
//!
//! The kind byte decides how a message is handled, so a content payload that
//! happens to equal the test marker is still staged.

use core::fmt;

use crate::error::MessageError;

/// Text sent by the test client to check reachability
pub const TEST_MARKER: &str = "scriptsocket:test";

/// Text the server replies with once a message was handled
pub const ACK_MARKER: &str = "scriptsocket:ok";

/// Discriminant byte at the start of every message body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Test = 0x01,
    Content = 0x02,
    Ack = 0x03,
}

impl TryFrom<u8> for MessageKind {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::Test),
            0x02 => Ok(MessageKind::Content),
            0x03 => Ok(MessageKind::Ack),
            other => Err(MessageError::UnknownKind(other)),
        }
    }
}

/// One logical exchange on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Reachability check; never staged
    Test,
    /// Script text to stage for the host application
    Content(String),
    /// Success reply from the server
    Ack,
}

impl Message {
    pub fn content(text: impl Into<String>) -> Self {
        Message::Content(text.into())
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Test => MessageKind::Test,
            Message::Content(_) => MessageKind::Content,
            Message::Ack => MessageKind::Ack,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Message::Test => TEST_MARKER,
            Message::Content(text) => text,
            Message::Ack => ACK_MARKER,
        }
    }

    /// Serialize into a frame body
    pub fn to_bytes(&self) -> Vec<u8> {
        let text = self.text().as_bytes();
        let mut body = Vec::with_capacity(1 + text.len());
        body.push(self.kind() as u8);
        body.extend_from_slice(text);
        body
    }

    /// Parse a frame body
    ///
    /// Test and Ack bodies are recognised by their kind byte alone; their
    /// text is not compared against the markers.
    pub fn from_bytes(body: &[u8]) -> Result<Self, MessageError> {
        let (&kind, text) = body.split_first().ok_or(MessageError::Empty)?;
        let kind = MessageKind::try_from(kind)?;
        let text = core::str::from_utf8(text).map_err(|_| MessageError::InvalidUtf8)?;

        Ok(match kind {
            MessageKind::Test => Message::Test,
            MessageKind::Content => Message::Content(text.to_string()),
            MessageKind::Ack => Message::Ack,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Test => write!(f, "test message"),
            Message::Content(text) => write!(f, "content ({} bytes)", text.len()),
            Message::Ack => write!(f, "acknowledgment"),
        }
    }
}
