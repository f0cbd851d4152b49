//! The logical message types `Connection::send`/`receive` exchange.
//!
//! `Received` is the low-level per-call envelope `receive` returns — a
//! chunk of bytes plus enough metadata (`message_type`, `end_of_message`)
//! for the caller to reassemble a full message across calls, exactly as
//! `spec.md` §4.9 describes. `Message` is the higher-level convenience type
//! the ambient event layer (`event.rs`/`server.rs`) hands out once a full
//! message has been reassembled.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Binary,
    Close,
}

/// A fully reassembled application message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Text(_) => MessageType::Text,
            Message::Binary(_) => MessageType::Binary,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    /// Builds a `Message` from a completed message's accumulated bytes and
    /// the type `receive` reported for it.
    pub fn from_parts(message_type: MessageType, bytes: Vec<u8>) -> Result<Self, Error> {
        match message_type {
            MessageType::Text => Ok(Message::Text(String::from_utf8(bytes)?)),
            MessageType::Binary => Ok(Message::Binary(bytes)),
            MessageType::Close => Err(Error::protocol("a Close notification is not an application message")),
        }
    }
}

/// One `Connection::receive` result.
///
/// `bytes` is how many bytes of `message_type`'s payload landed in the
/// caller's buffer this call; `end_of_message` tells the caller whether
/// this was the last chunk of the current logical message. For `Close`,
/// `bytes` is always 0 and the close metadata is populated instead.
#[derive(Debug, Clone)]
pub struct Received {
    pub bytes: usize,
    pub message_type: MessageType,
    pub end_of_message: bool,
    pub close_status: Option<u16>,
    pub close_description: Option<String>,
}
