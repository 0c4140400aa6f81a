//! livesync protocol - message vocabulary and payload parsing
//!
//! This crate names every message exchanged with editors and the remote
//! view service, and turns their JSON payloads into `livesync-core`
//! types.

pub mod message;
pub mod parse;

pub use message::{Envelope, MessageName};
pub use parse::{
    session_list, session_reply, Inbound, ProtocolError, RawEditor, RawError, RawSessionRecord,
};
