//! Session records and the outbound transport seam.
//!
//! A `Session` pairs an immutable identity with the transport used to reach
//! it. The registry owns membership; the protocol handler owns the
//! transport's open/close lifecycle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use jobswipe_core::Identity;

// ============================================================================
// Connection Id
// ============================================================================

/// Registry-unique handle for one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Session Sink
// ============================================================================

/// Errors writing to a session's transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("transport closed")]
    Closed,

    #[error("write timeout")]
    WriteTimeout,

    #[error("I/O error: {0}")]
    Io(String),
}

/// Outbound half of a session's transport.
///
/// Implementations must be safe to call from several tasks at once: the
/// heartbeat, the protocol handler and any number of fan-out calls may
/// write concurrently.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Writes one text message.
    async fn send_text(&self, text: &str) -> Result<(), SinkError>;

    /// Sends a close frame. Closing an already-closed transport may fail;
    /// callers treat that as harmless.
    async fn close(&self, code: u16, reason: &str) -> Result<(), SinkError>;
}

// ============================================================================
// Session
// ============================================================================

/// One admitted connection, as tracked by the registry.
#[derive(Clone)]
pub struct Session {
    pub id: ConnectionId,
    pub identity: Identity,
    pub sink: Arc<dyn SessionSink>,

    /// Cancelled by the registry when it evicts the session, so the
    /// owning protocol handler stops its read loop.
    pub cancel: CancellationToken,

    pub registered_at: DateTime<Utc>,
    pub last_pong: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            identity,
            sink,
            cancel,
            registered_at: now,
            last_pong: now,
        }
    }

    /// Records a liveness response.
    pub fn mark_alive(&mut self) {
        self.last_pong = Utc::now();
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            identity: self.identity,
            registered_at: self.registered_at,
            last_pong: self.last_pong,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("registered_at", &self.registered_at)
            .field("last_pong", &self.last_pong)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a session, safe to hand out of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: ConnectionId,
    pub identity: Identity,
    pub registered_at: DateTime<Utc>,
    pub last_pong: DateTime<Utc>,
}
