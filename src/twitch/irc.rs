// ABOUTME: Minimal IRC-over-WebSocket support for Twitch chat.
// ABOUTME: Line parsing (PRIVMSG, PING, 001 welcome) and a framed session wrapper.

use std::collections::VecDeque;

use anyhow::{bail, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// 001 welcome numeric; the server accepted our login.
    Ready,
    /// Server keepalive; must be answered with PONG carrying the payload.
    Ping(String),
    /// A chat message in a channel.
    Privmsg {
        username: String,
        channel: String,
        text: String,
    },
    /// Anything we don't handle (JOIN echoes, NOTICE, capability acks).
    Other(String),
}

/// Parse a single IRC line into an event. Unrecognized lines come back as
/// `Other` so callers can log them.
pub fn parse_line(line: &str) -> IrcEvent {
    if let Some(payload) = line.strip_prefix("PING ") {
        let payload = payload.strip_prefix(':').unwrap_or(payload);
        return IrcEvent::Ping(payload.to_string());
    }

    if let Some(rest) = line.strip_prefix(':') {
        if let Some((prefix, rest)) = rest.split_once(' ') {
            let (command, params) = match rest.split_once(' ') {
                Some((command, params)) => (command, params),
                None => (rest, ""),
            };
            match command {
                "001" => return IrcEvent::Ready,
                "PRIVMSG" => {
                    if let Some((target, text)) = params.split_once(" :") {
                        // Prefix is nick!user@host; the nick is what chat shows.
                        let username = prefix.split('!').next().unwrap_or(prefix);
                        return IrcEvent::Privmsg {
                            username: username.to_string(),
                            channel: target.trim().trim_start_matches('#').to_string(),
                            text: text.to_string(),
                        };
                    }
                }
                _ => {}
            }
        }
    }

    IrcEvent::Other(line.to_string())
}

/// Format a PRIVMSG line for a channel.
pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{channel} :{text}")
}

/// Split a WebSocket text frame into IRC lines. Twitch batches several
/// CRLF-terminated lines per frame.
fn buffer_lines(pending: &mut VecDeque<String>, payload: &str) {
    for line in payload.lines() {
        if !line.is_empty() {
            pending.push_back(line.to_string());
        }
    }
}

/// An authenticated IRC session over a WebSocket connection.
pub struct IrcSession {
    sink: WsSink,
    reader: WsReader,
    pending: VecDeque<String>,
}

impl IrcSession {
    /// Open the WebSocket. No IRC handshake happens here; call `login` next.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        let (sink, reader) = ws.split();
        Ok(Self {
            sink,
            reader,
            pending: VecDeque::new(),
        })
    }

    /// Send PASS/NICK. Twitch expects the token prefixed with "oauth:".
    pub async fn login(&mut self, access_token: &str, nick: &str) -> Result<()> {
        self.send_line(&format!("PASS oauth:{access_token}")).await?;
        self.send_line(&format!("NICK {nick}")).await?;
        Ok(())
    }

    /// Drain events until the 001 welcome arrives. Fails on a rejected login
    /// or a connection that closes mid-handshake.
    pub async fn await_ready(&mut self) -> Result<()> {
        loop {
            match self.next_event().await? {
                Some(IrcEvent::Ready) => return Ok(()),
                Some(IrcEvent::Ping(payload)) => self.pong(&payload).await?,
                Some(IrcEvent::Other(line))
                    if line.contains("Login authentication failed") =>
                {
                    bail!("Twitch rejected the login: {line}");
                }
                Some(_) => {}
                None => bail!("connection closed during login"),
            }
        }
    }

    pub async fn join(&mut self, channel: &str) -> Result<()> {
        self.send_line(&format!("JOIN #{channel}")).await
    }

    pub async fn send_privmsg(&mut self, channel: &str, text: &str) -> Result<()> {
        self.send_line(&privmsg(channel, text)).await
    }

    pub async fn pong(&mut self, payload: &str) -> Result<()> {
        self.send_line(&format!("PONG :{payload}")).await
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.sink
            .send(Message::Text(format!("{line}\r\n").into()))
            .await?;
        Ok(())
    }

    /// Next parsed IRC event. Returns Ok(None) when the peer closes the
    /// connection. WebSocket pings are answered internally.
    pub async fn next_event(&mut self) -> Result<Option<IrcEvent>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(parse_line(&line)));
            }

            match self.reader.next().await {
                Some(Ok(Message::Text(payload))) => {
                    buffer_lines(&mut self.pending, &payload);
                }
                Some(Ok(Message::Ping(payload))) => {
                    self.sink.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Send a close frame; errors are ignored since the peer may be gone.
    pub async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
