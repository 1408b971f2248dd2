//! Registry actor - owns all session membership and processes commands.
//!
//! The RegistryActor is the single owner of the identity → sessions maps.
//! It receives commands via an mpsc channel and publishes presence events
//! via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobswipe_core::Identity;

use super::commands::{OwnerTypeStats, PresenceEvent, RegistryCommand, RegistryStats};
use super::session::{ConnectionId, Session, SessionInfo, SessionSink};

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all session state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Ownership
///
/// The actor owns:
/// - `sessions`: every admitted session keyed by connection id
/// - `buckets`: identity → connection ids of its live sessions
///
/// Both maps are only ever mutated together inside one command, so a
/// session is either in exactly one bucket and in `sessions`, or in
/// neither. A bucket with no sessions is deleted in the same step.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Primary session storage
    sessions: HashMap<ConnectionId, Session>,

    /// Identity buckets. `BTreeSet` keeps snapshot order stable.
    buckets: HashMap<Identity, BTreeSet<ConnectionId>>,

    /// Presence publisher (online/offline transitions)
    event_publisher: broadcast::Sender<PresenceEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<PresenceEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            buckets: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!("Connection registry starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            sessions = self.sessions.len(),
            "Connection registry stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Admit {
                connection_id,
                identity,
                sink,
                cancel,
                respond_to,
            } => {
                let result = self.handle_admit(connection_id, identity, sink, cancel);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                connection_id,
                respond_to,
            } => {
                let removed = self.handle_remove(connection_id).is_some();
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Snapshot { target, respond_to } => {
                let _ = respond_to.send(self.handle_snapshot(target));
            }
            RegistryCommand::MarkAlive {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_mark_alive(connection_id));
            }
            RegistryCommand::GetSession {
                connection_id,
                respond_to,
            } => {
                let result = self.sessions.get(&connection_id).map(Session::info);
                let _ = respond_to.send(result);
            }
            RegistryCommand::IsOnline {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.buckets.contains_key(&identity));
            }
            RegistryCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.handle_stats());
            }
            RegistryCommand::Drain { respond_to } => {
                let _ = respond_to.send(self.handle_drain());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_admit(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
    ) -> SessionInfo {
        if let Some(existing) = self.sessions.get(&connection_id) {
            warn!(
                connection = %connection_id,
                identity = %existing.identity,
                requested = %identity,
                "Connection already admitted, keeping existing session"
            );
            return existing.info();
        }

        let session = Session::new(connection_id, identity, sink, cancel);
        let info = session.info();
        self.sessions.insert(connection_id, session);

        let bucket = self.buckets.entry(identity).or_default();
        let first = bucket.is_empty();
        bucket.insert(connection_id);
        let bucket_size = bucket.len();

        info!(
            connection = %connection_id,
            identity = %identity,
            identity_sessions = bucket_size,
            total_sessions = self.sessions.len(),
            "Session admitted"
        );

        if first {
            let _ = self.event_publisher.send(PresenceEvent::Online { identity });
        }

        info
    }

    fn handle_remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let Some(session) = self.sessions.remove(&connection_id) else {
            debug!(connection = %connection_id, "Remove called for untracked connection");
            return None;
        };

        let identity = session.identity;
        let mut now_empty = false;
        if let Some(bucket) = self.buckets.get_mut(&identity) {
            bucket.remove(&connection_id);
            now_empty = bucket.is_empty();
        }

        if now_empty {
            self.buckets.remove(&identity);
            let _ = self.event_publisher.send(PresenceEvent::Offline { identity });
        }

        info!(
            connection = %connection_id,
            identity = %identity,
            total_sessions = self.sessions.len(),
            identities = self.buckets.len(),
            "Session removed"
        );

        Some(session)
    }

    fn handle_snapshot(&self, target: Option<Identity>) -> Vec<Session> {
        match target {
            Some(identity) => self
                .buckets
                .get(&identity)
                .map(|bucket| {
                    bucket
                        .iter()
                        .filter_map(|id| self.sessions.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default(),
            None => {
                let mut all: Vec<Session> = self.sessions.values().cloned().collect();
                all.sort_by_key(|s| s.id);
                all
            }
        }
    }

    fn handle_mark_alive(&mut self, connection_id: ConnectionId) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(session) => {
                session.mark_alive();
                true
            }
            None => false,
        }
    }

    fn handle_stats(&self) -> RegistryStats {
        let mut by_owner_type = std::collections::BTreeMap::new();

        for (identity, bucket) in &self.buckets {
            let entry: &mut OwnerTypeStats = by_owner_type.entry(identity.owner_type).or_default();
            entry.identities += 1;
            entry.connections += bucket.len();
        }

        RegistryStats {
            total: self.sessions.len(),
            by_owner_type,
            unique_identities: self.buckets.len(),
            oldest_last_pong: self.sessions.values().map(|s| s.last_pong).min(),
        }
    }

    fn handle_drain(&mut self) -> Vec<Session> {
        let mut drained: Vec<Session> = self.sessions.drain().map(|(_, s)| s).collect();
        drained.sort_by_key(|s| s.id);

        for identity in self.buckets.drain().map(|(identity, _)| identity) {
            let _ = self.event_publisher.send(PresenceEvent::Offline { identity });
        }

        info!(sessions = drained.len(), "Registry drained");
        drained
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of identity buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
