//! WebSocket transport adapter.
//!
//! Splits an axum [`WebSocket`] into the inbound frame stream consumed by
//! the protocol handler and a [`SessionSink`] shared by the handler, the
//! heartbeat and registry fan-out.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::registry::{SessionSink, SinkError};

use super::connection::{InboundFrame, TransportError};

/// Default bound on a single outbound write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write half of a WebSocket.
///
/// Writes are serialized by a mutex. Each write, including the wait for
/// the mutex, is bounded by the write timeout so a stalled peer fails
/// instead of holding up fan-out.
pub struct WsSink {
    writer: Mutex<SplitSink<WebSocket, Message>>,
    write_timeout: Duration,
}

impl WsSink {
    pub fn new(writer: SplitSink<WebSocket, Message>, write_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(writer),
            write_timeout,
        }
    }

    async fn write(&self, msg: Message) -> Result<(), SinkError> {
        let send = async {
            let mut writer = self.writer.lock().await;
            writer.send(msg).await
        };

        match timeout(self.write_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Io(e.to_string())),
            Err(_) => Err(SinkError::WriteTimeout),
        }
    }
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send_text(&self, text: &str) -> Result<(), SinkError> {
        self.write(Message::Text(text.to_owned().into())).await
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), SinkError> {
        self.write(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_owned().into(),
        })))
        .await
    }
}

/// Splits a socket into the handler's inbound stream and outbound sink.
pub fn split_socket(
    socket: WebSocket,
    write_timeout: Duration,
) -> (
    impl Stream<Item = Result<InboundFrame, TransportError>> + Unpin + Send,
    WsSink,
) {
    let (writer, reader) = socket.split();
    (inbound_frames(reader), WsSink::new(writer, write_timeout))
}

fn inbound_frames(
    reader: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<InboundFrame, TransportError>> + Unpin + Send {
    reader.map(|msg| msg.map(to_frame).map_err(|e| TransportError(e.to_string())))
}

fn to_frame(msg: Message) -> InboundFrame {
    match msg {
        Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
        Message::Ping(_) | Message::Pong(_) => InboundFrame::Control,
        Message::Close(_) => InboundFrame::Close,
    }
}
