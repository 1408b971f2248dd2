//! WebSocket server for notification delivery.
//!
//! The server:
//! - Listens on a TCP socket and upgrades `GET /ws` to a WebSocket
//! - Spawns a ConnectionHandler for each client
//! - Serves registry stats on `GET /health`
//! - Accepts events from backend producers on `/internal/*` when an
//!   internal token is configured
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  NotifyServer   │
//! │                 │
//! │  axum Router    │
//! └───────┬─────────┘
//!         │ upgrade
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │◀──── event producers
//! │   (per client)  │     │                 │      (send_to / notify)
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! On shutdown, sockets still in the handshake are closed with
//! `GOING_AWAY` by their handlers, and the registry closes every admitted
//! session after sending it a `shutdown` notice.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;
mod internal;
mod transport;

pub use connection::{
    CloseReason, ConnectionError, ConnectionHandler, ConnectionSettings, ConnectionState,
    InboundFrame, TransportError, HANDSHAKE_TIMEOUT,
};
pub use transport::{split_socket, WsSink, DEFAULT_WRITE_TIMEOUT};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::AuthGate;
use crate::registry::{RegistryHandle, RegistryStats};

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Shared state handed to every request.
#[derive(Clone)]
struct AppState {
    registry: RegistryHandle,
    gate: AuthGate,
    settings: ConnectionSettings,
    write_timeout: Duration,
    shutdown: CancellationToken,

    /// Bearer secret for `/internal/*`; `None` leaves those routes unmounted
    internal_token: Option<Arc<str>>,
}

/// WebSocket notification server.
pub struct NotifyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: AppState,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl NotifyServer {
    /// Binds the listener.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to listen on; port 0 picks a free port
    /// * `registry` - Handle to the connection registry
    /// * `gate` - Authentication gate for handshakes
    /// * `cancel_token` - Token for graceful shutdown
    pub async fn bind(
        addr: &str,
        registry: RegistryHandle,
        gate: AuthGate,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            state: AppState {
                registry,
                gate,
                settings: ConnectionSettings::default(),
                write_timeout: DEFAULT_WRITE_TIMEOUT,
                shutdown: cancel_token.clone(),
                internal_token: None,
            },
            cancel_token,
        })
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.state.settings = settings;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.state.write_timeout = write_timeout;
        self
    }

    /// Enables the internal producer routes; empty tokens are ignored.
    pub fn with_internal_token(mut self, token: Option<String>) -> Self {
        self.state.internal_token = token
            .filter(|t| !t.trim().is_empty())
            .map(Arc::from);
        self
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the server.
    ///
    /// Serves until the cancellation token is triggered, then releases
    /// every registered session before returning.
    pub async fn run(self) -> Result<(), ServerError> {
        let registry = self.state.registry.clone();
        let cancel_token = self.cancel_token.clone();
        let router = build_router(self.state);

        info!(addr = %self.local_addr, "Notification server listening");

        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("Server shutdown requested");

                match registry.shutdown().await {
                    Ok(report) => {
                        info!(
                            sessions = report.attempted,
                            failed = report.failed,
                            "Sessions released"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to release sessions");
                    }
                }
            })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler));
    if state.internal_token.is_some() {
        router = router.merge(internal::routes());
    }
    router.with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one upgraded socket to completion.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (frames, sink) = split_socket(socket, state.write_timeout);

    let handler = ConnectionHandler::new(
        frames,
        Arc::new(sink),
        state.registry,
        state.gate,
        state.shutdown.child_token(),
    )
    .with_settings(state.settings);
    let connection = handler.id();

    if let Err(e) = handler.run().await {
        debug!(connection = %connection, error = %e, "Connection ended without a session");
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<RegistryStats>,
}

/// Registry occupancy as JSON.
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.registry.stats().await {
        Ok(stats) => Json(HealthResponse {
            status: "ok",
            connections: Some(stats),
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    connections: None,
                }),
            )
                .into_response()
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{InMemoryPrincipalStore, JwtAuthOracle};
    use crate::registry::spawn_registry;

    fn test_gate() -> AuthGate {
        AuthGate::new(
            Arc::new(JwtAuthOracle::new(b"server-secret")),
            Arc::new(InMemoryPrincipalStore::new()),
        )
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".to_string(),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = NotifyServer::bind(
            "127.0.0.1:0",
            spawn_registry(),
            test_gate(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let result = NotifyServer::bind(
            "not-an-address",
            spawn_registry(),
            test_gate(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = NotifyServer::bind("127.0.0.1:0", spawn_registry(), test_gate(), cancel.clone())
            .await
            .unwrap();

        let task = tokio::spawn(server.run());
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
