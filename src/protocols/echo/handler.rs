//! Per-connection echo loop.

use std::str::Utf8Error;
use thiserror::Error;
use tracing::trace;

use super::audit::{log_frame, Direction, FrameLog};
use super::frame::{CloseCode, CloseStatus, Message, MessageKind};
use super::parser::{self, Command, SERVER_CLOSE_REASON};
use crate::transport::{Connection, TransportError};

/// Progress of one session. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// How a session ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Peer sent a close frame; its status was echoed back.
    PeerClosed(CloseStatus),
    /// `ServerClose` command completed a server-initiated close.
    ServerClosed,
    /// `ServerAbort` command tore the connection down without a handshake.
    Aborted,
}

/// Fatal failure of a session.
#[derive(Debug, Error)]
pub enum EchoError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("text message is not valid UTF-8: {0}")]
    InvalidText(#[source] Utf8Error),
}

/// Drives one connection from open to closed, echoing every data message.
pub struct EchoLoop<C, L> {
    conn: C,
    log: L,
    state: SessionState,
}

impl<C: Connection, L: FrameLog> EchoLoop<C, L> {
    pub fn new(conn: C, log: L) -> Self {
        Self {
            conn,
            log,
            state: SessionState::Open,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Transport failures end the session immediately and are not retried.
    pub async fn run(mut self) -> Result<Termination, EchoError> {
        loop {
            let message = self.conn.receive().await?;
            log_frame(&self.log, Direction::Received, &message);

            if let Some(status) = message.close_status.clone() {
                self.transition(SessionState::Closing);
                self.conn.close(&status).await?;
                log_frame(&self.log, Direction::Sent, &Message::close(status.clone()));
                self.transition(SessionState::Closed);
                return Ok(Termination::PeerClosed(status));
            }

            if message.kind == MessageKind::Text {
                let text =
                    std::str::from_utf8(&message.payload).map_err(EchoError::InvalidText)?;
                match parser::parse(text) {
                    Some(Command::ServerClose) => {
                        self.transition(SessionState::Closing);
                        let status =
                            CloseStatus::new(CloseCode::NormalClosure, SERVER_CLOSE_REASON);
                        self.conn.close(&status).await?;
                        log_frame(&self.log, Direction::Sent, &Message::close(status));
                        self.transition(SessionState::Closed);
                        return Ok(Termination::ServerClosed);
                    }
                    Some(Command::ServerAbort) => {
                        self.conn.abort();
                        self.transition(SessionState::Closed);
                        return Ok(Termination::Aborted);
                    }
                    None => {}
                }
            }

            self.conn.send(&message).await?;
            log_frame(&self.log, Direction::Sent, &message);
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}
