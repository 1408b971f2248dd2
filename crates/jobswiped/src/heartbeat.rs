//! Per-session heartbeat.
//!
//! Every authenticated session gets one ping task that sends
//! `{"type":"ping"}` on a fixed interval. Missed pongs never disconnect a
//! session: a dead transport is reaped by the connection's read loop. The
//! ping keeps idle connections open through intermediaries and lets
//! `mark_alive` timestamps show up in registry stats.
//!
//! When revalidation is enabled, each tick first re-checks the session's
//! credential. An expired or revoked credential ends the session with a
//! policy-violation close.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()` in production code
//! - Write failures end the ping task; they never propagate

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use jobswipe_protocol::{close_code, error_text, ServerMessage};

use crate::auth::AuthGate;
use crate::registry::{ConnectionId, SessionSink};

/// Interval between liveness pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Credential re-check performed on every heartbeat tick.
pub struct Revalidation {
    pub gate: AuthGate,
    pub credential: String,

    /// Cancelled when the credential is no longer valid, so the owning
    /// connection tears the session down.
    pub session_cancel: CancellationToken,
}

/// Guard for a running ping task.
///
/// [`Heartbeat::stop`] cancels and joins the task. Dropping the guard
/// without stopping cancels and aborts it.
pub struct Heartbeat {
    connection_id: ConnectionId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Spawns the ping task. The first ping goes out one `period` after
    /// start.
    pub fn start(
        connection_id: ConnectionId,
        sink: Arc<dyn SessionSink>,
        period: Duration,
        revalidation: Option<Revalidation>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pings(
            connection_id,
            sink,
            period,
            revalidation,
            cancel.clone(),
        ));

        Self {
            connection_id,
            cancel,
            task: Some(task),
        }
    }

    /// Cancels the ping task and waits for it to finish. No ping is sent
    /// after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    debug!(connection = %self.connection_id, error = %e, "Heartbeat task failed");
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_pings(
    connection_id: ConnectionId,
    sink: Arc<dyn SessionSink>,
    period: Duration,
    revalidation: Option<Revalidation>,
    cancel: CancellationToken,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ping = match ServerMessage::Ping.to_json() {
        Ok(json) => json,
        Err(e) => {
            debug!(connection = %connection_id, error = %e, "Failed to encode ping");
            return;
        }
    };

    debug!(connection = %connection_id, interval_secs = period.as_secs(), "Heartbeat started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = tick.tick() => {
                if let Some(reval) = &revalidation {
                    if !reval.gate.revalidate(&reval.credential).await {
                        info!(connection = %connection_id, "Credential expired or revoked, closing session");
                        revoke_session(&*sink, reval).await;
                        break;
                    }
                }

                if let Err(e) = sink.send_text(&ping).await {
                    debug!(connection = %connection_id, error = %e, "Ping failed, stopping heartbeat");
                    break;
                }
            }
        }
    }

    debug!(connection = %connection_id, "Heartbeat stopped");
}

async fn revoke_session(sink: &dyn SessionSink, reval: &Revalidation) {
    if let Ok(json) = ServerMessage::error(error_text::TOKEN_REVOKED).to_json() {
        let _ = sink.send_text(&json).await;
    }
    let _ = sink
        .close(close_code::POLICY_VIOLATION, error_text::TOKEN_REVOKED)
        .await;
    reval.session_cancel.cancel();
}
