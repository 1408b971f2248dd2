//! Close codes, error codes and fixed error texts.

/// WebSocket close codes used by the server.
pub mod close_code {
    /// Session evicted after a failed write
    pub const NORMAL: u16 = 1000;

    /// Server going down
    pub const GOING_AWAY: u16 = 1001;

    /// Handshake violations and rejected credentials
    pub const POLICY_VIOLATION: u16 = 1008;
}

/// Machine-readable `code` values for `error` messages.
pub mod error_code {
    pub const INVALID_MESSAGE_FORMAT: &str = "INVALID_MESSAGE_FORMAT";
}

/// Human-readable texts sent in `error` messages.
pub mod error_text {
    pub const AUTH_TIMEOUT: &str = "Authentication timeout";
    pub const AUTH_REQUIRED_FIRST: &str = "First message must be authentication";
    pub const TOKEN_REQUIRED: &str = "Token is required";
    pub const INVALID_TOKEN: &str = "Invalid or expired token";
    pub const TOKEN_REVOKED: &str = "Token expired or revoked";
    pub const INVALID_JSON: &str = "Message must be valid JSON";
    pub const ALREADY_AUTHENTICATED: &str = "Already authenticated";
    pub const SERVER_SHUTDOWN: &str = "Server shutting down";
    pub const DELIVERY_FAILED: &str = "Delivery failed";
}
