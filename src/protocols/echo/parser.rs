//! In-band control command parser.

/// Text payload requesting a server-initiated close handshake.
pub const SERVER_CLOSE: &str = "ServerClose";

/// Text payload requesting an immediate abort of the connection.
pub const SERVER_ABORT: &str = "ServerAbort";

/// Reason sent with the close frame for [`Command::ServerClose`].
pub const SERVER_CLOSE_REASON: &str = "Closing from Server";

/// Parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Close the session with `NormalClosure`.
    ServerClose,
    /// Tear down the connection without a close handshake.
    ServerAbort,
}

/// Parse a decoded text payload as a control command.
///
/// Matching is exact and case-sensitive over the whole payload; anything
/// else is data and returns `None`.
pub fn parse(text: &str) -> Option<Command> {
    match text {
        SERVER_CLOSE => Some(Command::ServerClose),
        SERVER_ABORT => Some(Command::ServerAbort),
        _ => None,
    }
}
