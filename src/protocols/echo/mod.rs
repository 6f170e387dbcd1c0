//! WebSocket echo protocol.
//!
//! Every text and binary message received on an upgraded connection is sent
//! straight back with the same kind and end-of-message flag.
//!
//! ## Control Commands
//!
//! Two exact, case-sensitive text payloads are interpreted instead of echoed:
//!
//! ```text
//! ServerClose  -> close frame 1000 "Closing from Server", session ends
//! ServerAbort  -> connection dropped, no close frame
//! ```
//!
//! Binary payloads are never inspected.
//!
//! ## Close Handshake
//!
//! A close frame from the peer is answered with a close frame carrying the
//! same status code and reason, after which the session ends.
//!
//! ## Audit Log
//!
//! Each received and sent frame produces one debug line; see [`audit`].

pub mod audit;
pub mod frame;
pub mod handler;
pub mod parser;

pub use audit::TracingFrameLog;
pub use handler::{EchoLoop, Termination};
