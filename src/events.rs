// ABOUTME: Core bridge data types - inbound chat messages, outbound director events, replies.
// ABOUTME: Defines the JSON frames crossing the event channel and the connector state enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire event name for raw chat lines forwarded to the director for UI display.
pub const EVENT_TWITCH_MESSAGE: &str = "twitch_message";
/// Wire event name for scored inputs the director decides on.
pub const EVENT_SCORED: &str = "event";
/// Wire event name the director broadcasts replies under.
pub const EVENT_BOT_REPLY: &str = "bot_reply";

/// A single chat line received from the provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Author's login name as reported by the provider
    pub username: String,
    /// Message body
    pub text: String,
    /// When the provider delivered the line
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Where a scored event came from, as the director spells it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "TWITCH_MENTION")]
    Mention,
    #[serde(rename = "TWITCH_CHAT")]
    Chat,
}

/// Payload of a `twitch_message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub username: String,
    pub message: String,
}

/// Scoring metadata attached to a `ScoredEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub username: String,
    pub mentioned_bot: bool,
    pub message_length: usize,
    pub relevance: f64,
}

/// Payload of an `event` event - the scored input the director acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    #[serde(rename = "source_str")]
    pub source: SourceKind,
    pub text: String,
    pub metadata: EventMetadata,
    pub username: String,
}

/// Events the bridge emits to the director. Every inbound chat message
/// produces exactly one Raw followed by one Scored on the same connection.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Raw(RawMessage),
    Scored(ScoredEvent),
}

impl OutboundEvent {
    /// Wire event name this payload travels under.
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundEvent::Raw(_) => EVENT_TWITCH_MESSAGE,
            OutboundEvent::Scored(_) => EVENT_SCORED,
        }
    }
}

/// Reply broadcast by the director. An empty `reply` produces no chat output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotReply {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub is_censored: bool,
}

/// One JSON object per WebSocket text frame, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Connection lifecycle reported by each connector. Owned exclusively by the
/// connector; the orchestrator only observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

// =============================================================================
// Tests
// =============================================================================
