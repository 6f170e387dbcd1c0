//! Frame audit log.
//!
//! One debug line per frame crossing the connection, in either direction:
//!
//! ```text
//! Received Frame Text: Len=5, Fin=True: hello
//! Sent Frame Binary: Len=3, Fin=True: <<binary>>
//! Sent Frame Close: NormalClosure Closing from Server
//! ```

use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

use super::frame::{Message, MessageKind};

/// Marker written in place of binary payloads.
pub const BINARY_MARKER: &str = "<<binary>>";

/// Sink for audit lines.
pub trait FrameLog: Send + Sync {
    /// Write one debug-level line.
    fn debug(&self, line: &str);
}

/// Writes audit lines through `tracing`, tagged with the peer address.
#[derive(Debug, Clone, Copy)]
pub struct TracingFrameLog {
    peer: SocketAddr,
}

impl TracingFrameLog {
    pub fn new(peer: SocketAddr) -> Self {
        Self { peer }
    }
}

impl FrameLog for TracingFrameLog {
    fn debug(&self, line: &str) {
        debug!(peer = %self.peer, "{line}");
    }
}

/// Which way a frame travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Received,
    Sent,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Received => f.write_str("Received Frame"),
            Direction::Sent => f.write_str("Sent Frame"),
        }
    }
}

/// Render a message as a single human-readable line.
pub fn describe(message: &Message) -> String {
    if let Some(status) = &message.close_status {
        return format!("Close: {} {}", status.code, status.reason);
    }

    let fin = if message.end_of_message { "True" } else { "False" };
    match message.kind {
        MessageKind::Text => format!(
            "{}: Len={}, Fin={}: {}",
            message.kind,
            message.len(),
            fin,
            String::from_utf8_lossy(&message.payload)
        ),
        _ => format!(
            "{}: Len={}, Fin={}: {}",
            message.kind,
            message.len(),
            fin,
            BINARY_MARKER
        ),
    }
}

/// Write the audit line for one frame.
pub fn log_frame<L: FrameLog + ?Sized>(log: &L, direction: Direction, message: &Message) {
    log.debug(&format!("{direction} {}", describe(message)));
}
