//! Protocol handler for individual client connections.
//!
//! Each accepted transport gets its own `ConnectionHandler` that:
//! - Runs the authentication handshake under a hard timeout
//! - Admits the session to the registry and acknowledges the identity
//! - Starts the heartbeat and processes inbound messages
//! - Tears the session down on disconnect, eviction or shutdown
//!
//! ```text
//! CONNECTED ─▶ AWAITING_AUTH ─▶ AUTHENTICATED ─▶ CLOSED
//!                    │                              ▲
//!                    └──────────────────────────────┘
//!                 timeout / bad first message / bad token
//! ```
//!
//! The handler is transport-agnostic: it reads [`InboundFrame`]s from any
//! stream and writes through a [`SessionSink`].
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobswipe_core::Identity;
use jobswipe_protocol::{
    close_code, error_code, error_text, parse_client_message, ClientMessage, ServerMessage,
};

use crate::auth::{AuthError, AuthGate};
use crate::heartbeat::{Heartbeat, Revalidation, HEARTBEAT_INTERVAL};
use crate::registry::{ConnectionId, RegistryError, RegistryHandle, SessionSink, SinkError};

/// Hard bound on how long a new connection may stay unauthenticated.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Frames
// ============================================================================

/// One inbound transport frame, reduced to what the protocol cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Transport-level ping/pong; answered by the transport itself
    Control,
    Close,
}

/// The transport failed while reading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    AwaitingAuth,
    Authenticated,
    Closed,
}

/// Per-connection timing knobs. Production uses the defaults.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub handshake_timeout: Duration,
    pub heartbeat_interval: Duration,

    /// Re-check the credential on every heartbeat tick
    pub revalidate_tokens: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            revalidate_tokens: true,
        }
    }
}

/// Why an authenticated session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended
    PeerClosed,

    /// Reading or replying failed
    Transport(String),

    /// The session token was cancelled: server shutdown, registry
    /// eviction after a failed write, or a revoked credential
    Cancelled,
}

// ============================================================================
// Errors
// ============================================================================

/// Ways a connection can end without an authenticated session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("no authentication message within the handshake timeout")]
    HandshakeTimeout,

    #[error("first message was not an authentication message: {0}")]
    UnexpectedFirstMessage(String),

    #[error("authentication message carried no token")]
    MissingToken,

    #[error("authentication failed: {0}")]
    AuthFailed(#[from] AuthError),

    #[error("peer closed during handshake")]
    PeerClosed,

    #[error("server shutting down")]
    Shutdown,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("write failed: {0}")]
    Sink(#[from] SinkError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

// ============================================================================
// Connection Handler
// ============================================================================

/// Protocol state machine for a single connection.
pub struct ConnectionHandler<S> {
    frames: S,
    ctx: Context,
}

/// Everything the handler needs besides the inbound stream.
struct Context {
    id: ConnectionId,
    sink: Arc<dyn SessionSink>,
    registry: RegistryHandle,
    gate: AuthGate,
    settings: ConnectionSettings,

    /// Server-wide shutdown. Once authenticated, the session ends through
    /// its own token, which registry shutdown cancels after the close notice.
    shutdown: CancellationToken,

    state: watch::Sender<ConnectionState>,
}

impl<S> ConnectionHandler<S>
where
    S: Stream<Item = Result<InboundFrame, TransportError>> + Unpin + Send,
{
    /// Creates a handler for a freshly accepted transport.
    pub fn new(
        frames: S,
        sink: Arc<dyn SessionSink>,
        registry: RegistryHandle,
        gate: AuthGate,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            frames,
            ctx: Context {
                id: registry.next_connection_id(),
                sink,
                registry,
                gate,
                settings: ConnectionSettings::default(),
                shutdown,
                state,
            },
        }
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.ctx.settings = settings;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.ctx.id
    }

    /// Observes state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    /// Runs the connection to completion.
    ///
    /// Returns `Err` if the handshake did not produce a session, or
    /// `Ok` with the reason an authenticated session ended.
    pub async fn run(mut self) -> Result<CloseReason, ConnectionError> {
        let id = self.ctx.id;
        debug!(connection = %id, "Connection accepted");
        self.ctx.set_state(ConnectionState::AwaitingAuth);

        let (identity, credential) = match self.handshake().await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.ctx.set_state(ConnectionState::Closed);
                match &e {
                    ConnectionError::PeerClosed | ConnectionError::Shutdown => {
                        debug!(connection = %id, reason = %e, "Connection closed before authentication");
                    }
                    _ => {
                        warn!(connection = %id, error = %e, "Handshake failed");
                    }
                }
                return Err(e);
            }
        };

        let result = self.serve_session(identity, credential).await;
        self.ctx.set_state(ConnectionState::Closed);

        match &result {
            Ok(reason) => {
                info!(connection = %id, identity = %identity, reason = ?reason, "Session closed");
            }
            Err(e) => {
                warn!(connection = %id, identity = %identity, error = %e, "Session ended with error");
            }
        }
        result
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Waits for the authentication message and resolves its credential.
    ///
    /// Every rejection sends an `error` message followed by a
    /// policy-violation close.
    async fn handshake(&mut self) -> Result<(Identity, String), ConnectionError> {
        let ctx = &self.ctx;
        let frames = &mut self.frames;
        let deadline = Instant::now() + ctx.settings.handshake_timeout;

        let frame = loop {
            let next = tokio::select! {
                biased;

                _ = ctx.shutdown.cancelled() => {
                    let _ = ctx
                        .sink
                        .close(close_code::GOING_AWAY, error_text::SERVER_SHUTDOWN)
                        .await;
                    return Err(ConnectionError::Shutdown);
                }

                next = timeout_at(deadline, frames.next()) => next,
            };

            match next {
                Err(_) => {
                    ctx.reject(error_text::AUTH_TIMEOUT).await;
                    return Err(ConnectionError::HandshakeTimeout);
                }
                Ok(None) | Ok(Some(Ok(InboundFrame::Close))) => {
                    return Err(ConnectionError::PeerClosed);
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(InboundFrame::Control))) => continue,
                Ok(Some(Ok(frame))) => break frame,
            }
        };

        let text = match frame {
            InboundFrame::Text(text) => text,
            _ => {
                ctx.reject(error_text::AUTH_REQUIRED_FIRST).await;
                return Err(ConnectionError::UnexpectedFirstMessage("binary".to_string()));
            }
        };

        let token = match parse_client_message(&text) {
            Ok(ClientMessage::Authenticate { token: Some(token) }) => token,
            Ok(ClientMessage::Authenticate { token: None }) => {
                ctx.reject(error_text::TOKEN_REQUIRED).await;
                return Err(ConnectionError::MissingToken);
            }
            Ok(other) => {
                ctx.reject(error_text::AUTH_REQUIRED_FIRST).await;
                return Err(ConnectionError::UnexpectedFirstMessage(other.kind().to_string()));
            }
            Err(e) => {
                ctx.reject(error_text::AUTH_REQUIRED_FIRST).await;
                return Err(ConnectionError::UnexpectedFirstMessage(e.to_string()));
            }
        };

        match ctx.gate.authenticate(&token).await {
            Ok(identity) => Ok((identity, token)),
            Err(e) => {
                ctx.reject(error_text::INVALID_TOKEN).await;
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Authenticated session
    // ========================================================================

    async fn serve_session(
        &mut self,
        identity: Identity,
        credential: String,
    ) -> Result<CloseReason, ConnectionError> {
        let ctx = &self.ctx;
        let session_cancel = CancellationToken::new();

        ctx.registry
            .admit(ctx.id, identity, ctx.sink.clone(), session_cancel.clone())
            .await?;
        let admitted = AdmittedGuard::new(ctx.registry.clone(), ctx.id);

        // Registry shutdown drains after the server token fires, so an
        // admit that lands later would never get the close notice.
        if ctx.shutdown.is_cancelled() {
            let _ = ctx
                .sink
                .close(close_code::GOING_AWAY, error_text::SERVER_SHUTDOWN)
                .await;
            admitted.release().await?;
            return Ok(CloseReason::Cancelled);
        }

        if let Err(e) = ctx.send(&ServerMessage::authenticated(&identity)).await {
            admitted.release().await?;
            return Ok(CloseReason::Transport(e.to_string()));
        }

        ctx.set_state(ConnectionState::Authenticated);
        info!(connection = %ctx.id, identity = %identity, "Session authenticated");

        let revalidation = ctx.settings.revalidate_tokens.then(|| Revalidation {
            gate: ctx.gate.clone(),
            credential,
            session_cancel: session_cancel.clone(),
        });
        let heartbeat = Heartbeat::start(
            ctx.id,
            ctx.sink.clone(),
            ctx.settings.heartbeat_interval,
            revalidation,
        );

        let outcome = message_loop(&mut self.frames, &self.ctx, &session_cancel).await;

        // Stop probing before the session leaves the registry.
        heartbeat.stop().await;
        admitted.release().await?;

        outcome
    }
}

async fn message_loop<S>(
    frames: &mut S,
    ctx: &Context,
    session_cancel: &CancellationToken,
) -> Result<CloseReason, ConnectionError>
where
    S: Stream<Item = Result<InboundFrame, TransportError>> + Unpin + Send,
{
    loop {
        let next = tokio::select! {
            biased;

            _ = session_cancel.cancelled() => return Ok(CloseReason::Cancelled),

            next = frames.next() => next,
        };

        let result = match next {
            None | Some(Ok(InboundFrame::Close)) => return Ok(CloseReason::PeerClosed),
            Some(Err(e)) => return Ok(CloseReason::Transport(e.0)),
            Some(Ok(InboundFrame::Control)) => continue,
            Some(Ok(InboundFrame::Binary(_))) => ctx.reply_malformed().await,
            Some(Ok(InboundFrame::Text(text))) => ctx.handle_text(&text).await,
        };

        match result {
            Ok(()) => {}
            Err(ConnectionError::Sink(e)) => return Ok(CloseReason::Transport(e.to_string())),
            Err(e) => return Err(e),
        }
    }
}

impl Context {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn handle_text(&self, text: &str) -> Result<(), ConnectionError> {
        match parse_client_message(text) {
            Ok(ClientMessage::Pong) => {
                self.registry.mark_alive(self.id).await?;
                Ok(())
            }
            Ok(ClientMessage::Authenticate { .. }) => {
                self.send(&ServerMessage::error(error_text::ALREADY_AUTHENTICATED))
                    .await
            }
            Ok(ClientMessage::Unknown { kind }) => {
                debug!(connection = %self.id, kind = ?kind, "Ignoring unhandled message type");
                Ok(())
            }
            Err(e) => {
                debug!(connection = %self.id, error = %e, "Malformed message");
                self.reply_malformed().await
            }
        }
    }

    async fn reply_malformed(&self) -> Result<(), ConnectionError> {
        self.send(&ServerMessage::error_with_code(
            error_text::INVALID_JSON,
            error_code::INVALID_MESSAGE_FORMAT,
        ))
        .await
    }

    async fn reject(&self, message: &str) {
        if let Err(e) = self.send(&ServerMessage::error(message)).await {
            debug!(connection = %self.id, error = %e, "Failed to send handshake error");
        }
        let _ = self.sink.close(close_code::POLICY_VIOLATION, message).await;
    }

    async fn send(&self, msg: &ServerMessage) -> Result<(), ConnectionError> {
        let json = msg
            .to_json()
            .map_err(|e| ConnectionError::Sink(SinkError::Io(e.to_string())))?;
        self.sink.send_text(&json).await?;
        Ok(())
    }
}

// ============================================================================
// Admission guard
// ============================================================================

/// Removes an admitted session from the registry.
///
/// The normal path awaits [`AdmittedGuard::release`]. If the handler is
/// dropped before that (task aborted, panic), the removal is spawned.
struct AdmittedGuard {
    registry: RegistryHandle,
    id: ConnectionId,
    armed: bool,
}

impl AdmittedGuard {
    fn new(registry: RegistryHandle, id: ConnectionId) -> Self {
        Self {
            registry,
            id,
            armed: true,
        }
    }

    async fn release(mut self) -> Result<bool, RegistryError> {
        self.armed = false;
        self.registry.remove(self.id).await
    }
}

impl Drop for AdmittedGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = self.registry.clone();
        let id = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = registry.remove(id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{InMemoryPrincipalStore, JwtAuthOracle};
    use crate::registry::{spawn_registry, RegistryCommand};
    use crate::test_support::RecordingSink;
    use futures::channel::mpsc as fmpsc;
    use futures::SinkExt;
    use jobswipe_core::{OwnerType, Principal};
    use tokio::sync::{broadcast, mpsc};
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    const SECRET: &[u8] = b"connection-secret";

    type Frames = fmpsc::UnboundedSender<Result<InboundFrame, TransportError>>;

    struct Harness {
        frames: Frames,
        sink: Arc<RecordingSink>,
        state: watch::Receiver<ConnectionState>,
        task: JoinHandle<Result<CloseReason, ConnectionError>>,
        id: ConnectionId,
    }

    fn gate(principals: Vec<Principal>) -> (AuthGate, Arc<JwtAuthOracle>) {
        let oracle = Arc::new(JwtAuthOracle::new(SECRET));
        let store = Arc::new(InMemoryPrincipalStore::from_principals(principals));
        (AuthGate::new(oracle.clone(), store), oracle)
    }

    fn start(registry: RegistryHandle, gate: AuthGate, shutdown: CancellationToken) -> Harness {
        let (frames, rx) = fmpsc::unbounded();
        let sink = RecordingSink::new();
        let handler = ConnectionHandler::new(rx, sink.clone(), registry, gate, shutdown);
        let state = handler.watch_state();
        let id = handler.id();
        let task = tokio::spawn(handler.run());
        Harness {
            frames,
            sink,
            state,
            task,
            id,
        }
    }

    async fn send_text(frames: &mut Frames, text: &str) {
        frames
            .send(Ok(InboundFrame::Text(text.to_string())))
            .await
            .unwrap();
    }

    async fn wait_for(state: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
        state.wait_for(|s| *s == want).await.unwrap();
    }

    fn auth_json(token: &str) -> String {
        serde_json::json!({"type": "authenticate", "token": token}).to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let registry = spawn_registry();
        let (gate, _) = gate(vec![]);
        let h = start(registry.clone(), gate, CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(11)).await;

        let result = h.task.await.unwrap();
        assert_eq!(result, Err(ConnectionError::HandshakeTimeout));

        let messages = h.sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "error");
        assert_eq!(messages[0]["message"], "Authentication timeout");
        assert_eq!(h.sink.closes()[0].0, close_code::POLICY_VIOLATION);
        assert_eq!(*h.state.borrow(), ConnectionState::Closed);
        drop(h.frames);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_frames_do_not_extend_deadline() {
        let registry = spawn_registry();
        let (gate, _) = gate(vec![]);
        let mut h = start(registry, gate, CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(5)).await;
        h.frames.send(Ok(InboundFrame::Control)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(h.task.await.unwrap(), Err(ConnectionError::HandshakeTimeout));
    }

    #[tokio::test]
    async fn test_first_message_must_authenticate() {
        let registry = spawn_registry();
        let (gate, _) = gate(vec![]);
        let mut h = start(registry, gate, CancellationToken::new());

        send_text(&mut h.frames, r#"{"type":"pong"}"#).await;

        let result = h.task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::UnexpectedFirstMessage(_))));
        assert_eq!(
            h.sink.messages()[0]["message"],
            "First message must be authentication"
        );
        assert_eq!(h.sink.closes()[0].0, close_code::POLICY_VIOLATION);
    }

    #[tokio::test]
    async fn test_malformed_or_binary_first_frame() {
        for frame in [
            InboundFrame::Text("not json".to_string()),
            InboundFrame::Binary(vec![1, 2, 3]),
        ] {
            let registry = spawn_registry();
            let (gate, _) = gate(vec![]);
            let mut h = start(registry, gate, CancellationToken::new());

            h.frames.send(Ok(frame)).await.unwrap();

            let result = h.task.await.unwrap();
            assert!(matches!(result, Err(ConnectionError::UnexpectedFirstMessage(_))));
            assert_eq!(h.sink.closes()[0].0, close_code::POLICY_VIOLATION);
        }
    }

    #[tokio::test]
    async fn test_missing_token() {
        let registry = spawn_registry();
        let (gate, _) = gate(vec![]);
        let mut h = start(registry, gate, CancellationToken::new());

        send_text(&mut h.frames, r#"{"type":"authenticate"}"#).await;

        assert_eq!(h.task.await.unwrap(), Err(ConnectionError::MissingToken));
        assert_eq!(h.sink.messages()[0]["message"], "Token is required");
        assert_eq!(h.sink.closes()[0].0, close_code::POLICY_VIOLATION);
    }

    #[tokio::test]
    async fn test_bad_credential_never_admits() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(16);
        let spy = RegistryHandle::new(cmd_tx, event_tx);

        let id = Uuid::new_v4();
        let (gate, oracle) = gate(vec![Principal::user(id)]);
        let expired = oracle
            .sign(&crate::auth::TokenClaims {
                sub: id.to_string(),
                exp: chrono::Utc::now().timestamp() - 60,
                token_type: Some("access".to_string()),
            })
            .unwrap();
        let mut tampered = oracle.issue(&id.to_string(), Duration::from_secs(60)).unwrap();
        tampered.insert(tampered.len() / 2, 'A');

        for token in [expired, tampered] {
            let mut h = start(spy.clone(), gate.clone(), CancellationToken::new());
            send_text(&mut h.frames, &auth_json(&token)).await;

            let result = h.task.await.unwrap();
            assert!(matches!(result, Err(ConnectionError::AuthFailed(_))));
            assert_eq!(h.sink.messages()[0]["message"], "Invalid or expired token");
            assert_eq!(h.sink.closes()[0].0, close_code::POLICY_VIOLATION);
        }

        assert!(
            !matches!(cmd_rx.try_recv(), Ok(RegistryCommand::Admit { .. })),
            "no admit may reach the registry"
        );
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_authenticated_session_lifecycle() {
        let registry = spawn_registry();
        let org = Uuid::new_v4();
        let member = Uuid::new_v4();
        let (gate, oracle) = gate(vec![Principal::company_member(member, org)]);
        let token = oracle.issue(&member.to_string(), Duration::from_secs(60)).unwrap();

        let mut h = start(registry.clone(), gate, CancellationToken::new());
        send_text(&mut h.frames, &auth_json(&token)).await;
        wait_for(&mut h.state, ConnectionState::Authenticated).await;

        let ack = &h.sink.messages()[0];
        assert_eq!(ack["type"], "authenticated");
        assert_eq!(ack["company_id"], org.to_string());
        assert!(ack.get("user_id").is_none());
        assert!(registry.is_online(Identity::company(org)).await.unwrap());

        h.frames.send(Ok(InboundFrame::Close)).await.unwrap();
        assert_eq!(h.task.await.unwrap(), Ok(CloseReason::PeerClosed));

        assert!(registry.get_session(h.id).await.unwrap().is_none());
        assert_eq!(registry.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_malformed_mid_session_message_is_tolerated() {
        let registry = spawn_registry();
        let id = Uuid::new_v4();
        let (gate, oracle) = gate(vec![Principal::user(id)]);
        let token = oracle.issue(&id.to_string(), Duration::from_secs(60)).unwrap();

        let mut h = start(registry.clone(), gate, CancellationToken::new());
        send_text(&mut h.frames, &auth_json(&token)).await;
        wait_for(&mut h.state, ConnectionState::Authenticated).await;
        let before = registry.get_session(h.id).await.unwrap().unwrap().last_pong;

        send_text(&mut h.frames, "{not json").await;
        h.frames.send(Ok(InboundFrame::Binary(vec![0]))).await.unwrap();
        send_text(&mut h.frames, r#"{"type":"subscribe"}"#).await;
        send_text(&mut h.frames, &auth_json(&token)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        send_text(&mut h.frames, r#"{"type":"pong"}"#).await;

        // Wait for the pong to be processed
        let mut after = before;
        for _ in 0..100 {
            after = registry.get_session(h.id).await.unwrap().unwrap().last_pong;
            if after > before {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(after > before, "pong after malformed input still marks alive");
        assert_eq!(*h.state.borrow(), ConnectionState::Authenticated);

        let messages = h.sink.messages();
        assert_eq!(messages[1]["type"], "error");
        assert_eq!(messages[1]["code"], "INVALID_MESSAGE_FORMAT");
        assert_eq!(messages[1]["message"], "Message must be valid JSON");
        assert_eq!(messages[2]["code"], "INVALID_MESSAGE_FORMAT");
        assert_eq!(messages[3]["message"], "Already authenticated");
        assert_eq!(messages.len(), 4, "unknown types are ignored");
        assert!(h.sink.closes().is_empty());

        drop(h.frames);
        assert_eq!(h.task.await.unwrap(), Ok(CloseReason::PeerClosed));
    }

    #[tokio::test]
    async fn test_eviction_ends_session() {
        let registry = spawn_registry();
        let id = Uuid::new_v4();
        let (gate, oracle) = gate(vec![Principal::user(id)]);
        let token = oracle.issue(&id.to_string(), Duration::from_secs(60)).unwrap();

        let mut h = start(registry.clone(), gate, CancellationToken::new());
        send_text(&mut h.frames, &auth_json(&token)).await;
        wait_for(&mut h.state, ConnectionState::Authenticated).await;

        h.sink.set_failing(true);
        let report = registry
            .send_to(OwnerType::User, id, &serde_json::json!({"type": "x"}))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        assert_eq!(h.task.await.unwrap(), Ok(CloseReason::Cancelled));
        assert!(!registry.is_online(Identity::user(id)).await.unwrap());
        drop(h.frames);
    }

    #[tokio::test]
    async fn test_shutdown_while_awaiting_auth() {
        let registry = spawn_registry();
        let (gate, _) = gate(vec![]);
        let shutdown = CancellationToken::new();
        let h = start(registry, gate, shutdown.clone());

        shutdown.cancel();

        assert_eq!(h.task.await.unwrap(), Err(ConnectionError::Shutdown));
        assert_eq!(h.sink.closes()[0].0, close_code::GOING_AWAY);
        assert!(h.sink.messages().is_empty());
        drop(h.frames);
    }

    #[tokio::test]
    async fn test_shutdown_ends_authenticated_session() {
        let registry = spawn_registry();
        let id = Uuid::new_v4();
        let (gate, oracle) = gate(vec![Principal::user(id)]);
        let token = oracle.issue(&id.to_string(), Duration::from_secs(60)).unwrap();
        let shutdown = CancellationToken::new();

        let mut h = start(registry.clone(), gate, shutdown.clone());
        send_text(&mut h.frames, &auth_json(&token)).await;
        wait_for(&mut h.state, ConnectionState::Authenticated).await;

        shutdown.cancel();
        let report = registry.shutdown().await.unwrap();
        assert_eq!(report.attempted, 1);

        assert_eq!(h.task.await.unwrap(), Ok(CloseReason::Cancelled));
        assert_eq!(registry.stats().await.unwrap().total, 0);

        let last = h.sink.messages().pop().unwrap();
        assert_eq!(last["type"], "shutdown");
        assert_eq!(
            h.sink.closes(),
            vec![(close_code::GOING_AWAY, error_text::SERVER_SHUTDOWN.to_string())]
        );
        drop(h.frames);
    }
}
