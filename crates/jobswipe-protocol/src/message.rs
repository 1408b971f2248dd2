//! Protocol message types for notification sessions.

use jobswipe_core::{Identity, Notification, OwnerType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages a client may send.
///
/// Inbound text is classified leniently by [`crate::parse_client_message`]
/// rather than deserialized strictly, so unknown message types can be
/// ignored instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Handshake: `{"type":"authenticate","token":"<bearer>"}`.
    ///
    /// `token` is `None` when the field is missing, empty or not a string.
    Authenticate { token: Option<String> },

    /// Liveness response to a server `ping`
    Pong,

    /// Valid JSON of a type this server does not handle
    Unknown { kind: Option<String> },
}

impl ClientMessage {
    /// Short label for logging.
    pub fn kind(&self) -> &str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Pong => "pong",
            Self::Unknown { kind } => kind.as_deref().unwrap_or("<untyped>"),
        }
    }
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted; exactly one of the ids is present
    Authenticated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        company_id: Option<Uuid>,
        message: String,
    },

    /// Error report (handshake or mid-session)
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Liveness check
    Ping,

    /// A live notification
    Notification { data: Notification },

    /// Close notice sent to every session before server shutdown
    Shutdown { message: String },
}

impl ServerMessage {
    /// Creates the handshake acknowledgment for a resolved identity.
    pub fn authenticated(identity: &Identity) -> Self {
        let id = *identity.owner_id.as_uuid();
        let (user_id, company_id) = match identity.owner_type {
            OwnerType::User => (Some(id), None),
            OwnerType::Company => (None, Some(id)),
        };
        Self::Authenticated {
            user_id,
            company_id,
            message: "Successfully authenticated".to_string(),
        }
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    /// Creates an error response with code.
    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    pub fn notification(data: Notification) -> Self {
        Self::Notification { data }
    }

    pub fn shutdown(message: &str) -> Self {
        Self::Shutdown {
            message: message.to_string(),
        }
    }

    /// Serializes to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
