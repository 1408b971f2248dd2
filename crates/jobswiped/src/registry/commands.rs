//! Registry actor commands, errors, reports and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `DeliveryReport` / `RegistryStats`: Results handed back to callers
//! - `PresenceEvent`: Events published when identities come online or go offline
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use jobswipe_core::{Identity, OwnerType};

use super::session::{ConnectionId, Session, SessionInfo, SessionSink};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
pub enum RegistryCommand {
    /// Admit a session under an identity bucket.
    ///
    /// If the connection id is already tracked, the existing record is
    /// returned unchanged.
    Admit {
        connection_id: ConnectionId,
        identity: Identity,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
        respond_to: oneshot::Sender<SessionInfo>,
    },

    /// Remove a session; responds `false` if it was not tracked.
    Remove {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Copy the sessions of one bucket (`Some`) or of every bucket (`None`).
    ///
    /// The copy is what fan-out iterates; the actor never performs I/O.
    Snapshot {
        target: Option<Identity>,
        respond_to: oneshot::Sender<Vec<Session>>,
    },

    /// Refresh a session's last-pong timestamp.
    MarkAlive {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Get a single session by id.
    GetSession {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<SessionInfo>>,
    },

    /// Whether an identity currently has at least one session.
    IsOnline {
        identity: Identity,
        respond_to: oneshot::Sender<bool>,
    },

    /// Read-only counters.
    Stats {
        respond_to: oneshot::Sender<RegistryStats>,
    },

    /// Remove every session in one step and hand them back for closing.
    Drain {
        respond_to: oneshot::Sender<Vec<Session>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Individual transport failures are never errors; they show up in
/// `DeliveryReport::failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The actor is gone. Callers should treat this as fatal.
    #[error("registry channel closed")]
    ChannelClosed,

    /// The event could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialize(String),
}

impl RegistryError {
    pub fn serialize<E: std::fmt::Display>(err: E) -> Self {
        Self::Serialize(err.to_string())
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Sessions a write was attempted on
    pub attempted: usize,

    /// Writes that failed; those sessions have been removed
    pub failed: usize,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.attempted.saturating_sub(self.failed)
    }
}

/// Per-owner-type counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwnerTypeStats {
    pub connections: usize,
    pub identities: usize,
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Live sessions across all identities
    pub total: usize,

    pub by_owner_type: BTreeMap<OwnerType, OwnerTypeStats>,

    /// Identities with at least one live session
    pub unique_identities: usize,

    /// Least recent liveness response among live sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_last_pong: Option<DateTime<Utc>>,
}

impl RegistryStats {
    pub fn for_owner_type(&self, owner_type: OwnerType) -> OwnerTypeStats {
        self.by_owner_type
            .get(&owner_type)
            .copied()
            .unwrap_or_default()
    }
}

// ============================================================================
// Presence Events
// ============================================================================

/// Published when an identity's bucket is created or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// First session for this identity was admitted
    Online { identity: Identity },

    /// Last session for this identity was removed
    Offline { identity: Identity },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivered_count() {
        let report = DeliveryReport {
            attempted: 3,
            failed: 1,
        };
        assert_eq!(report.delivered(), 2);
        assert_eq!(DeliveryReport::default().delivered(), 0);
    }

    #[test]
    fn test_stats_missing_owner_type_is_zero() {
        let stats = RegistryStats::default();
        assert_eq!(stats.for_owner_type(OwnerType::Company), OwnerTypeStats::default());
    }

    #[test]
    fn test_stats_serialize_owner_type_keys() {
        let mut stats = RegistryStats::default();
        stats.by_owner_type.insert(
            OwnerType::User,
            OwnerTypeStats {
                connections: 2,
                identities: 1,
            },
        );
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_owner_type"]["user"]["connections"], 2);
        assert!(json.get("oldest_last_pong").is_none());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RegistryError::ChannelClosed.to_string(), "registry channel closed");
        assert!(RegistryError::serialize("boom").to_string().contains("boom"));
    }
}
