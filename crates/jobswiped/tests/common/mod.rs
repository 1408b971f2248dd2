//! Shared helpers for the jobswiped integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jobswipe_core::Identity;
use jobswiped::registry::{ConnectionId, RegistryHandle, SessionSink, SinkError};

/// In-memory transport that records writes and can be told to fail.
#[derive(Default)]
pub struct TestSink {
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<(u16, String)>>,
    failing: AtomicBool,
    gate: Option<Arc<Notify>>,
}

impl TestSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose writes block until `release` is notified.
    pub fn stalled(release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(release),
            ..Self::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionSink for TestSink {
    async fn send_text(&self, text: &str) -> Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), SinkError> {
        self.closes.lock().unwrap().push((code, reason.to_string()));
        Ok(())
    }
}

/// Admits a fresh session for `identity` and returns its id, sink and token.
pub async fn admit(
    registry: &RegistryHandle,
    identity: Identity,
) -> (ConnectionId, Arc<TestSink>, CancellationToken) {
    let sink = TestSink::new();
    let (id, cancel) = admit_with(registry, identity, sink.clone()).await;
    (id, sink, cancel)
}

pub async fn admit_with(
    registry: &RegistryHandle,
    identity: Identity,
    sink: Arc<TestSink>,
) -> (ConnectionId, CancellationToken) {
    let id = registry.next_connection_id();
    let cancel = CancellationToken::new();
    registry
        .admit(id, identity, sink, cancel.clone())
        .await
        .expect("admit should succeed");
    (id, cancel)
}

pub fn user() -> Identity {
    Identity::user(Uuid::new_v4())
}

pub fn company() -> Identity {
    Identity::company(Uuid::new_v4())
}
