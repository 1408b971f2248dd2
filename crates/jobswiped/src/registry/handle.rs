//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor, fanning events out to live sessions and subscribing
//! to presence events.
//!
//! Fan-out never runs inside the actor. The handle asks the actor for a
//! snapshot of the target sessions, writes to all of them concurrently from
//! the caller's task, then asks the actor to remove the ones that failed.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobswipe_core::{Identity, NotificationEvent, OwnerId, OwnerType};
use jobswipe_protocol::{close_code, error_text, ServerMessage};

use super::commands::{
    DeliveryReport, PresenceEvent, RegistryCommand, RegistryError, RegistryStats,
};
use super::session::{ConnectionId, Session, SessionInfo, SessionSink};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to presence changes
    event_sender: broadcast::Sender<PresenceEvent>,

    /// Connection id allocator shared by every clone
    next_id: Arc<AtomicU64>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<PresenceEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocates a connection id unique within this registry.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Sends a command and waits for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Register a session under `identity`, creating the bucket if needed.
    ///
    /// `cancel` is cancelled if the registry later evicts the session
    /// (failed write or shutdown). Admitting an id that is already tracked
    /// returns the existing record.
    pub async fn admit(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
    ) -> Result<SessionInfo, RegistryError> {
        self.request(|respond_to| RegistryCommand::Admit {
            connection_id,
            identity,
            sink,
            cancel,
            respond_to,
        })
        .await
    }

    /// Unregister a session. Returns `false` if it was not tracked, which
    /// is not an error: concurrent or repeated removal is expected.
    pub async fn remove(&self, connection_id: ConnectionId) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Remove {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Refresh a session's last-pong time. Returns `false` if untracked.
    pub async fn mark_alive(&self, connection_id: ConnectionId) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::MarkAlive {
            connection_id,
            respond_to,
        })
        .await
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Deliver `event` to every live session of one identity.
    ///
    /// An identity without live sessions yields `(0, 0)`. A session whose
    /// write fails is counted in `failed`, removed from the registry and
    /// evicted before this returns; the other sessions still receive the
    /// event.
    pub async fn send_to<T: Serialize + ?Sized>(
        &self,
        owner_type: OwnerType,
        owner_id: impl Into<OwnerId>,
        event: &T,
    ) -> Result<DeliveryReport, RegistryError> {
        let identity = Identity::new(owner_type, owner_id);
        let payload = serde_json::to_string(event).map_err(RegistryError::serialize)?;
        let targets = self.snapshot(Some(identity)).await?;

        let report = self.fan_out(targets, &payload).await?;
        debug!(
            identity = %identity,
            attempted = report.attempted,
            failed = report.failed,
            "Event sent to identity"
        );
        Ok(report)
    }

    /// Deliver a persisted notification to its target identity.
    pub async fn notify(&self, event: &NotificationEvent) -> Result<DeliveryReport, RegistryError> {
        let msg = ServerMessage::notification(event.notification.clone());
        self.send_to(event.target.owner_type, event.target.owner_id, &msg)
            .await
    }

    /// Deliver `event` to every live session of every identity.
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        event: &T,
    ) -> Result<DeliveryReport, RegistryError> {
        let payload = serde_json::to_string(event).map_err(RegistryError::serialize)?;
        let targets = self.snapshot(None).await?;

        let report = self.fan_out(targets, &payload).await?;
        debug!(
            attempted = report.attempted,
            failed = report.failed,
            "Event broadcast"
        );
        Ok(report)
    }

    async fn snapshot(&self, target: Option<Identity>) -> Result<Vec<Session>, RegistryError> {
        self.request(|respond_to| RegistryCommand::Snapshot { target, respond_to })
            .await
    }

    /// Writes `payload` to every target concurrently, then removes and
    /// evicts the ones that failed.
    async fn fan_out(
        &self,
        targets: Vec<Session>,
        payload: &str,
    ) -> Result<DeliveryReport, RegistryError> {
        if targets.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let results = join_all(targets.iter().map(|session| async move {
            (session, session.sink.send_text(payload).await)
        }))
        .await;

        let mut report = DeliveryReport {
            attempted: targets.len(),
            failed: 0,
        };

        for (session, result) in results {
            if let Err(e) = result {
                report.failed += 1;
                warn!(
                    connection = %session.id,
                    identity = %session.identity,
                    error = %e,
                    "Failed to deliver to session, removing"
                );
                self.remove(session.id).await?;
                session.cancel.cancel();

                // Best effort, off the delivery path.
                let sink = Arc::clone(&session.sink);
                let id = session.id;
                tokio::spawn(async move {
                    if let Err(e) = sink
                        .close(close_code::NORMAL, error_text::DELIVERY_FAILED)
                        .await
                    {
                        debug!(connection = %id, error = %e, "Close after failed write also failed");
                    }
                });
            }
        }

        Ok(report)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a single session by id. `Ok(None)` if it is not tracked.
    pub async fn get_session(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<SessionInfo>, RegistryError> {
        self.request(|respond_to| RegistryCommand::GetSession {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Whether `identity` has at least one live session.
    pub async fn is_online(&self, identity: Identity) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::IsOnline {
            identity,
            respond_to,
        })
        .await
    }

    /// Read-only occupancy snapshot.
    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        self.request(|respond_to| RegistryCommand::Stats { respond_to })
            .await
    }

    /// Subscribe to presence events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Release every tracked session.
    ///
    /// Sessions are drained from the registry in one step, sent a
    /// `shutdown` close notice, closed with `GOING_AWAY` and evicted.
    /// Write failures are counted, never propagated.
    pub async fn shutdown(&self) -> Result<DeliveryReport, RegistryError> {
        let sessions = self.request(|respond_to| RegistryCommand::Drain { respond_to }).await?;
        if sessions.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let notice = ServerMessage::shutdown(error_text::SERVER_SHUTDOWN);
        let payload = serde_json::to_string(&notice).map_err(RegistryError::serialize)?;

        let results = join_all(sessions.iter().map(|session| {
            let payload = payload.as_str();
            async move {
                let sent = session.sink.send_text(payload).await;
                let _ = session
                    .sink
                    .close(close_code::GOING_AWAY, error_text::SERVER_SHUTDOWN)
                    .await;
                session.cancel.cancel();
                sent
            }
        }))
        .await;

        let report = DeliveryReport {
            attempted: sessions.len(),
            failed: results.iter().filter(|r| r.is_err()).count(),
        };

        info!(
            sessions = report.attempted,
            failed = report.failed,
            "All sessions released"
        );
        Ok(report)
    }
}
