//! In-memory transport used by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::registry::{SessionSink, SinkError};

/// Records every write; can be switched into a failing mode.
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<(u16, String)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let sink = Self::new();
        sink.set_failing(true);
        sink
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Sent texts parsed as JSON.
    pub(crate) fn messages(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub(crate) fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionSink for RecordingSink {
    async fn send_text(&self, text: &str) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), SinkError> {
        if let Ok(mut closes) = self.closes.lock() {
            closes.push((code, reason.to_string()));
        }
        Ok(())
    }
}
