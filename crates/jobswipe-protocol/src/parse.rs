//! Parsing inbound client text frames.

use serde_json::Value;
use thiserror::Error;

use crate::message::ClientMessage;

/// Errors from parsing a client frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The frame was not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Classifies one inbound text frame.
///
/// Only malformed JSON is an error. Anything that parses but is not a
/// recognized message comes back as [`ClientMessage::Unknown`].
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let kind = value.get("type").and_then(Value::as_str);

    let msg = match kind {
        Some("authenticate") => ClientMessage::Authenticate {
            token: value
                .get("token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        },
        Some("pong") => ClientMessage::Pong,
        other => ClientMessage::Unknown {
            kind: other.map(str::to_string),
        },
    };

    Ok(msg)
}
