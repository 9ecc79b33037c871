// ABOUTME: Twitch chat connector: device-flow auth, IRC session loop, outbound queue.
// ABOUTME: Delivers inbound chat to a registered callback and queues outbound replies FIFO.

pub mod auth;
pub mod irc;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TwitchConfig;
use crate::events::{ChatMessage, ConnectionState};
use crate::metrics;
use crate::reconnect::{
    is_connection_failure_chain, wait_or_cancelled, BackoffConfig, BackoffState,
};
use auth::TokenPair;
use irc::{IrcEvent, IrcSession};

/// Callback invoked for each chat message from other users.
pub type MessageCallback = Arc<dyn Fn(ChatMessage) + Send + Sync>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to Twitch chat and keeps the session alive. Cheap to clone;
/// clones share tokens, queue, and connection state.
#[derive(Clone)]
pub struct TwitchConnector {
    config: TwitchConfig,
    http: reqwest::Client,
    tokens: Arc<RwLock<Option<TokenPair>>>,
    queue: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
    on_message: Arc<RwLock<Option<MessageCallback>>>,
    state: Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
}

impl TwitchConnector {
    pub fn new(config: TwitchConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            tokens: Arc::new(RwLock::new(None)),
            queue: Arc::new(RwLock::new(None)),
            on_message: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            cancel: CancellationToken::new(),
        }
    }

    /// Run the device-code grant and store the resulting tokens. Returns
    /// false on failure; the connector stays usable for everything except
    /// `start`.
    pub async fn authenticate(&self) -> bool {
        match self.run_device_flow().await {
            Ok(tokens) => {
                let mut slot = self.tokens.write().unwrap_or_else(|e| e.into_inner());
                *slot = Some(tokens);
                info!("Twitch authentication complete");
                true
            }
            Err(e) => {
                metrics::record_error("twitch_auth");
                error!(error = %e, "Twitch authentication failed");
                false
            }
        }
    }

    async fn run_device_flow(&self) -> Result<TokenPair> {
        let device = auth::request_device_code(
            &self.http,
            &self.config.device_endpoint,
            &self.config.client_id,
        )
        .await?;

        info!(
            url = %device.verification_uri,
            code = %device.user_code,
            "Visit the verification URL and enter the code to authorize chat"
        );

        auth::poll_for_token(
            &self.http,
            &self.config.token_endpoint,
            &self.config.client_id,
            &device,
        )
        .await
    }

    /// Register the inbound chat handler. Calling again replaces the previous
    /// handler.
    pub fn set_message_callback(&self, callback: MessageCallback) {
        let mut slot = self.on_message.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
    }

    /// Spawn the chat session loop. Fails fast when `authenticate` has not
    /// stored tokens.
    pub fn start(&self) -> Result<()> {
        {
            let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
            if tokens.is_none() {
                bail!("authenticate() must succeed before starting the chat connector");
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut queue = self.queue.write().unwrap_or_else(|e| e.into_inner());
            *queue = Some(tx);
        }

        let connector = self.clone();
        tokio::spawn(async move {
            connector.session_loop(rx).await;
        });
        Ok(())
    }

    /// Signal the session loop to shut down.
    pub fn stop(&self) {
        self.set_state(ConnectionState::ShuttingDown);
        self.cancel.cancel();
    }

    /// Queue a message for the channel, reporting whether it was handed to
    /// the session loop. Messages accepted while the session is reconnecting
    /// are delivered once it is back; messages sent before `start` are
    /// dropped with a warning.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        let queue = self.queue.read().unwrap_or_else(|e| e.into_inner());
        match queue.as_ref() {
            Some(tx) => {
                if tx.send(text.into()).is_ok() {
                    true
                } else {
                    warn!("Chat session loop is gone, dropping outbound message");
                    false
                }
            }
            None => {
                warn!("Cannot send, chat client not ready yet");
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, new: ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = new;
    }

    async fn session_loop(&self, mut rx: mpsc::UnboundedReceiver<String>) {
        let mut backoff = BackoffState::new(BackoffConfig::default());

        while !self.cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            info!(
                url = %self.config.chat_url,
                channel = %self.config.channel,
                "Connecting to Twitch chat"
            );

            match tokio::time::timeout(CONNECT_TIMEOUT, self.establish()).await {
                Ok(Ok(session)) => {
                    backoff.record_success();
                    self.set_state(ConnectionState::Connected);
                    metrics::record_connector_connected("twitch");
                    info!(channel = %self.config.channel, "Joined Twitch channel");

                    let served = self.serve_session(session, &mut rx).await;
                    self.set_state(ConnectionState::Disconnected);

                    match served {
                        Ok(()) => info!("Twitch chat connection closed"),
                        Err(e) => warn!(error = %e, "Twitch chat connection lost"),
                    }
                }
                Ok(Err(e)) if is_connection_failure_chain(&e) => {
                    let delay = backoff.record_failure();
                    self.set_state(ConnectionState::Disconnected);
                    metrics::record_error("twitch_connect");
                    warn!(
                        failures = backoff.consecutive_failures(),
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "Twitch chat unreachable"
                    );
                    if !wait_or_cancelled(delay, &self.cancel).await {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    self.set_state(ConnectionState::Disconnected);
                    metrics::record_error("twitch_unexpected");
                    error!(error = %e, "Unexpected error connecting to Twitch chat");
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
                        "Timed out connecting to Twitch chat"
                    );
                    if !wait_or_cancelled(delay, &self.cancel).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Twitch connector stopped");
    }

    /// Connect, authenticate the IRC session, and join the channel.
    async fn establish(&self) -> Result<IrcSession> {
        let access_token = {
            let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
            match tokens.as_ref() {
                Some(pair) => pair.access_token.clone(),
                None => bail!("no access token available"),
            }
        };

        let mut session = IrcSession::connect(&self.config.chat_url).await?;
        session.login(&access_token, &self.config.bot_name).await?;
        session.await_ready().await?;
        session.join(&self.config.channel).await?;
        Ok(session)
    }

    /// Pump one live session: inbound lines to the callback, queued messages
    /// out. A failed send drops that message and keeps the session; transport
    /// death surfaces through the read side.
    async fn serve_session(
        &self,
        mut session: IrcSession,
        rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    session.close().await;
                    return Ok(());
                }
                event = session.next_event() => {
                    match event? {
                        Some(IrcEvent::Privmsg { username, text, .. }) => {
                            self.handle_privmsg(username, text);
                        }
                        Some(IrcEvent::Ping(payload)) => session.pong(&payload).await?,
                        Some(IrcEvent::Ready) | Some(IrcEvent::Other(_)) => {}
                        None => return Ok(()),
                    }
                }
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(text) => {
                            match session.send_privmsg(&self.config.channel, &text).await {
                                Ok(()) => {
                                    metrics::record_chat_message_sent();
                                    debug!(chars = text.len(), "Sent chat message");
                                }
                                Err(e) => warn!(error = %e, "Failed to send chat message"),
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn handle_privmsg(&self, username: String, text: String) {
        // Our own messages echo back on the same connection.
        if username.eq_ignore_ascii_case(&self.config.bot_name) {
            return;
        }

        metrics::record_chat_message_received();
        let message = ChatMessage::new(username, text);

        let callback = {
            let slot = self.on_message.read().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };
        match callback {
            Some(callback) => callback(message),
            None => debug!("No message handler registered, discarding chat message"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
