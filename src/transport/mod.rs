//! Message transport used by the echo loop.
//!
//! The loop only needs four capabilities from an upgraded connection:
//! receive one message, send one message, close with a status, and abort.
//! `websocket` provides the tungstenite-backed implementation used by the
//! server; tests drive the loop with scripted fakes.

pub mod websocket;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocols::echo::frame::{CloseStatus, Message};

pub use websocket::WsConnection;

/// Transport-level failure. Fatal for the connection it occurred on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("connection was aborted")]
    Aborted,

    #[error("connection closed without a close frame")]
    Closed,

    #[error("text payload is not valid UTF-8")]
    InvalidText,
}

/// An already-upgraded, message-oriented connection.
///
/// Owned by exactly one echo loop; at most one receive is outstanding and
/// sends never overlap.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next complete message.
    async fn receive(&mut self) -> Result<Message, TransportError>;

    /// Send one message with the given kind and end-of-message flag.
    async fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Perform the close handshake with the given status.
    async fn close(&mut self, status: &CloseStatus) -> Result<(), TransportError>;

    /// Tear the connection down immediately without sending anything.
    fn abort(&mut self);
}
