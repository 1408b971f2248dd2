//! Connection registry using Actor pattern.
//!
//! The registry is the single source of truth for which transport sessions
//! are live and which identity each one belongs to. It receives commands via
//! a tokio mpsc channel, so admit and remove are linearizable without any
//! lock being held across network I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ConnectionHandler │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └──────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   PresenceEvent       │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!    Admit/Remove          HashMap<Identity,        Presence
//!    sessions              BTreeSet<ConnectionId>>  subscribers
//! ```
//!
//! Producers (`send_to`, `broadcast`) take a snapshot from the actor and
//! write to the sessions from their own task.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;
mod session;

pub use actor::RegistryActor;
pub use commands::{
    DeliveryReport, OwnerTypeStats, PresenceEvent, RegistryCommand, RegistryError, RegistryStats,
};
pub use handle::RegistryHandle;
pub use session::{ConnectionId, Session, SessionInfo, SessionSink, SinkError};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Returns a RegistryHandle for client use
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use jobswiped::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///
///     let stats = handle.stats().await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
