// ABOUTME: WebSocket connector for the director decision service.
// ABOUTME: Owns the reconnect loop, the outbound event writer, and bot_reply dispatch.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{BotReply, ConnectionState, Frame, EVENT_BOT_REPLY};
use crate::metrics;
use crate::reconnect::{is_connection_failure, wait_or_cancelled, BackoffConfig, BackoffState};

/// Callback invoked for each bot_reply frame received from the director.
pub type ReplyCallback = Arc<dyn Fn(BotReply) + Send + Sync>;

type CallbackCell = Arc<RwLock<Option<ReplyCallback>>>;
type WriterSlot = Arc<RwLock<Option<mpsc::UnboundedSender<Frame>>>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maintains a persistent WebSocket connection to the director and exposes a
/// fire-and-forget `send` for outbound events. Cheap to clone; clones share
/// the connection state.
#[derive(Clone)]
pub struct DirectorConnector {
    url: String,
    state: Arc<RwLock<ConnectionState>>,
    writer: WriterSlot,
    on_reply: CallbackCell,
    cancel: CancellationToken,
}

impl DirectorConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(RwLock::new(None)),
            on_reply: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    /// Register the bot_reply handler. Calling again replaces the previous
    /// handler; the connection is untouched.
    pub fn on_reply(&self, callback: ReplyCallback) {
        let mut slot = self
            .on_reply
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
    }

    /// Spawn the connection loop. Returns immediately; the loop runs until
    /// `stop` is called.
    pub fn start(&self) {
        let connector = self.clone();
        tokio::spawn(async move {
            connector.connection_loop().await;
        });
    }

    /// Signal the connection loop to shut down.
    pub fn stop(&self) {
        self.set_state(ConnectionState::ShuttingDown);
        self.cancel.cancel();
    }

    /// Queue an event frame for the director. When no connection is up the
    /// event is dropped with a warning; delivery is never retried.
    pub fn send<T: Serialize>(&self, event: &str, data: &T) {
        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                error!(event = %event, error = %e, "Failed to serialize event payload");
                return;
            }
        };

        let writer = self.writer.read().unwrap_or_else(|e| e.into_inner());
        let delivered = match writer.as_ref() {
            Some(tx) => tx.send(Frame::new(event, data)).is_ok(),
            None => false,
        };
        drop(writer);

        if delivered {
            metrics::record_event_sent(event);
        } else {
            metrics::record_event_dropped(event);
            warn!(event = %event, "Dropping event, director not connected");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, new: ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = new;
    }

    fn clear_writer(&self) {
        let mut writer = self.writer.write().unwrap_or_else(|e| e.into_inner());
        *writer = None;
    }

    async fn connection_loop(&self) {
        let mut backoff = BackoffState::new(BackoffConfig::default());

        while !self.cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            info!(url = %self.url, "Connecting to director");

            match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&self.url)).await {
                Ok(Ok((ws, _response))) => {
                    backoff.record_success();
                    self.set_state(ConnectionState::Connected);
                    metrics::record_connector_connected("director");
                    info!("Connected to director");

                    let (tx, rx) = mpsc::unbounded_channel();
                    {
                        let mut writer =
                            self.writer.write().unwrap_or_else(|e| e.into_inner());
                        *writer = Some(tx);
                    }

                    let served =
                        serve_connection(ws, rx, self.on_reply.clone(), &self.cancel).await;

                    self.clear_writer();
                    self.set_state(ConnectionState::Disconnected);

                    match served {
                        Ok(()) => info!("Director connection closed"),
                        Err(e) => warn!(error = %e, "Director connection lost"),
                    }
                }
                Ok(Err(e)) if is_connection_failure(&e) => {
                    let delay = backoff.record_failure();
                    self.set_state(ConnectionState::Disconnected);
                    metrics::record_error("director_connect");
                    warn!(
                        failures = backoff.consecutive_failures(),
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "Director unreachable"
                    );
                    if !wait_or_cancelled(delay, &self.cancel).await {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    self.set_state(ConnectionState::Disconnected);
                    metrics::record_error("director_unexpected");
                    error!(error = %e, "Unexpected error connecting to director");
                    if !wait_or_cancelled(backoff.unexpected_delay(), &self.cancel).await {
                        break;
                    }
                }
                Err(_elapsed) => {
                    let delay = backoff.record_failure();
                    self.set_state(ConnectionState::Disconnected);
                    warn!(
                        failures = backoff.consecutive_failures(),
                        retry_in_secs = delay.as_secs(),
                        timeout_secs = CONNECT_TIMEOUT.as_secs(),
                        "Timed out connecting to director"
                    );
                    if !wait_or_cancelled(delay, &self.cancel).await {
                        break;
                    }
                }
            }
        }

        self.clear_writer();
        self.set_state(ConnectionState::Disconnected);
        info!("Director connector stopped");
    }
}

/// Pump one established connection: forward queued frames out, dispatch
/// bot_reply frames in. Returns Ok on orderly close, Err on a transport error.
async fn serve_connection(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut write_rx: mpsc::UnboundedReceiver<Frame>,
    on_reply: CallbackCell,
    cancel: &CancellationToken,
) -> Result<()> {
    let (mut sink, mut reader) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            incoming = reader.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => dispatch_frame(&text, &on_reply),
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            outgoing = write_rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        let json = serde_json::to_string(&frame)?;
                        sink.send(Message::Text(json.into())).await?;
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Parse one text frame and hand bot_reply payloads to the registered
/// callback. Malformed frames are logged and skipped.
fn dispatch_frame(text: &str, on_reply: &CallbackCell) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Discarding unparseable frame from director");
            return;
        }
    };

    if frame.event != EVENT_BOT_REPLY {
        debug!(event = %frame.event, "Ignoring unhandled director event");
        return;
    }

    let reply: BotReply = match serde_json::from_value(frame.data) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Discarding malformed bot_reply payload");
            return;
        }
    };

    metrics::record_reply_received();

    let callback = {
        let slot = on_reply.read().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    };
    match callback {
        Some(callback) => callback(reply),
        None => debug!("No reply handler registered, discarding bot_reply"),
    }
}

// =============================================================================
// Tests
// =============================================================================
