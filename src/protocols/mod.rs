//! Protocol implementations.
//!
//! - `echo`: WebSocket echo with in-band close/abort commands

pub mod echo;
