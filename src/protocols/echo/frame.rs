//! Message model shared by the echo loop and the transport.

use bytes::Bytes;
use std::fmt;

/// Kind of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
    Close,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Text => "Text",
            MessageKind::Binary => "Binary",
            MessageKind::Close => "Close",
        };
        f.write_str(name)
    }
}

/// WebSocket close status code (RFC 6455 section 7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    NormalClosure,
    GoingAway,
    ProtocolError,
    UnsupportedData,
    /// Peer closed without supplying a status. Never sent on the wire.
    Empty,
    InvalidPayloadData,
    PolicyViolation,
    MessageTooBig,
    MandatoryExtension,
    InternalServerError,
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::NormalClosure,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::Empty,
            1007 => CloseCode::InvalidPayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalServerError,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::NormalClosure => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::Empty => 1005,
            CloseCode::InvalidPayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalServerError => 1011,
            CloseCode::Other(code) => code,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCode::NormalClosure => f.write_str("NormalClosure"),
            CloseCode::GoingAway => f.write_str("GoingAway"),
            CloseCode::ProtocolError => f.write_str("ProtocolError"),
            CloseCode::UnsupportedData => f.write_str("UnsupportedData"),
            CloseCode::Empty => f.write_str("Empty"),
            CloseCode::InvalidPayloadData => f.write_str("InvalidPayloadData"),
            CloseCode::PolicyViolation => f.write_str("PolicyViolation"),
            CloseCode::MessageTooBig => f.write_str("MessageTooBig"),
            CloseCode::MandatoryExtension => f.write_str("MandatoryExtension"),
            CloseCode::InternalServerError => f.write_str("InternalServerError"),
            CloseCode::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Close status carried by a close notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseStatus {
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// One message received from or sent to the peer.
///
/// Each receive yields one complete message; fragments are never reassembled
/// here, `end_of_message` is carried through as delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
    pub end_of_message: bool,
    /// Present only on close notifications.
    pub close_status: Option<CloseStatus>,
}

impl Message {
    /// Complete text message.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: payload.into(),
            end_of_message: true,
            close_status: None,
        }
    }

    /// Complete binary message.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
            end_of_message: true,
            close_status: None,
        }
    }

    /// Close notification.
    pub fn close(status: CloseStatus) -> Self {
        Self {
            kind: MessageKind::Close,
            payload: Bytes::new(),
            end_of_message: true,
            close_status: Some(status),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_close(&self) -> bool {
        self.close_status.is_some()
    }
}
