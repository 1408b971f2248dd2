//! jobswipe Protocol - Wire protocol for notification sessions
//!
//! This crate provides message types and parsing for the JSON envelopes
//! exchanged over a notification WebSocket: the authentication handshake,
//! ping/pong liveness, errors and notification delivery.

pub mod codes;
pub mod message;
pub mod parse;

pub use codes::{close_code, error_code, error_text};
pub use message::{ClientMessage, ServerMessage};
pub use parse::{parse_client_message, ParseError};
