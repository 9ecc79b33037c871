// ABOUTME: Bridge orchestrator: wires chat messages to director events and replies back to chat.
// ABOUTME: Owns mention detection, reply text cleanup, and startup/shutdown sequencing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::director::DirectorConnector;
use crate::events::{
    BotReply, ChatMessage, EventMetadata, OutboundEvent, RawMessage, ScoredEvent, SourceKind,
};
use crate::twitch::TwitchConnector;

/// Relevance attached to every scored event. Real scoring happens in the
/// director; this is just a neutral default.
pub const PLACEHOLDER_RELEVANCE: f64 = 0.5;

/// What chat sees instead of a censored reply.
const CENSORED_PLACEHOLDER: &str = "*censored*";

/// Head start the event channel gets before chat traffic begins.
const STARTUP_GRACE: Duration = Duration::from_secs(1);

/// Case-insensitive substring match against the bot's known aliases.
#[derive(Clone)]
pub struct MentionDetector {
    pattern: Option<Regex>,
}

impl MentionDetector {
    pub fn new(aliases: &[String]) -> Result<Self> {
        let alternation = aliases
            .iter()
            .map(|alias| alias.trim())
            .filter(|alias| !alias.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");

        let pattern = if alternation.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&format!("({alternation})"))
                    .case_insensitive(true)
                    .build()?,
            )
        };
        Ok(Self { pattern })
    }

    pub fn is_mentioned(&self, text: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    }
}

/// Strips sound-effect annotations and normalizes spacing in director replies.
#[derive(Clone)]
pub struct ReplyCleaner {
    asterisk: Regex,
    bracketed: Regex,
    whitespace: Regex,
    punct_gap: Regex,
}

impl ReplyCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            asterisk: Regex::new(r"\*[A-Za-z]+\*")?,
            bracketed: Regex::new(r"\[[A-Za-z]+\]")?,
            whitespace: Regex::new(r"\s+")?,
            punct_gap: Regex::new(r"\s+([,.!?;:])")?,
        })
    }

    /// Remove `*laughs*` / `[sighs]` annotations, collapse whitespace runs,
    /// trim, and close gaps before punctuation.
    pub fn clean(&self, text: &str) -> String {
        let text = self.asterisk.replace_all(text, "");
        let text = self.bracketed.replace_all(&text, "");
        let text = self.whitespace.replace_all(&text, " ");
        let text = text.trim();
        self.punct_gap.replace_all(text, "$1").into_owned()
    }
}

/// Owns both connectors and the transforms between them.
pub struct Bridge {
    director: DirectorConnector,
    twitch: TwitchConnector,
    mentions: MentionDetector,
    cleaner: ReplyCleaner,
}

impl Bridge {
    pub fn new(
        director: DirectorConnector,
        twitch: TwitchConnector,
        aliases: &[String],
    ) -> Result<Self> {
        Ok(Self {
            director,
            twitch,
            mentions: MentionDetector::new(aliases)?,
            cleaner: ReplyCleaner::new()?,
        })
    }

    /// Authenticate, wire the callbacks, and bring both connectors up. A
    /// failed authentication disables chat for this run but the event channel
    /// still starts.
    pub async fn start(&self) -> Result<()> {
        let authenticated = self.twitch.authenticate().await;
        if !authenticated {
            warn!("Twitch authentication failed, chat is disabled for this run");
        }

        let director = self.director.clone();
        let mentions = self.mentions.clone();
        self.twitch.set_message_callback(Arc::new(move |message| {
            forward_chat_message(&director, &mentions, &message);
        }));

        let twitch = self.twitch.clone();
        let cleaner = self.cleaner.clone();
        self.director.on_reply(Arc::new(move |reply| {
            deliver_reply(&twitch, &cleaner, reply);
        }));

        self.director.start();

        // The director should be reachable before chat traffic starts flowing.
        tokio::time::sleep(STARTUP_GRACE).await;

        if authenticated {
            self.twitch.start()?;
        }

        info!("Bridge started");
        Ok(())
    }

    /// Stop both connectors, chat side first.
    pub fn shutdown(&self) {
        self.twitch.stop();
        self.director.stop();
        info!("Bridge shut down");
    }
}

/// Build the scored event for one chat message.
fn score_message(mentions: &MentionDetector, message: &ChatMessage) -> ScoredEvent {
    let mentioned = mentions.is_mentioned(&message.text);
    ScoredEvent {
        source: if mentioned {
            SourceKind::Mention
        } else {
            SourceKind::Chat
        },
        text: message.text.clone(),
        metadata: EventMetadata {
            username: message.username.clone(),
            mentioned_bot: mentioned,
            message_length: message.text.chars().count(),
            relevance: PLACEHOLDER_RELEVANCE,
        },
        username: message.username.clone(),
    }
}

/// Forward one chat message to the director: raw first, then scored, on the
/// same connection.
fn forward_chat_message(
    director: &DirectorConnector,
    mentions: &MentionDetector,
    message: &ChatMessage,
) {
    let raw = OutboundEvent::Raw(RawMessage {
        username: message.username.clone(),
        message: message.text.clone(),
    });
    let scored = OutboundEvent::Scored(score_message(mentions, message));

    emit(director, &raw);
    emit(director, &scored);
}

fn emit(director: &DirectorConnector, event: &OutboundEvent) {
    match event {
        OutboundEvent::Raw(payload) => director.send(event.event_name(), payload),
        OutboundEvent::Scored(payload) => director.send(event.event_name(), payload),
    }
}

/// Turn a director reply into the chat line to send, or None to drop it.
fn render_reply(cleaner: &ReplyCleaner, reply: &BotReply) -> Option<String> {
    if reply.reply.is_empty() {
        return None;
    }

    let outgoing = if reply.is_censored {
        CENSORED_PLACEHOLDER.to_string()
    } else {
        cleaner.clean(&reply.reply)
    };

    if outgoing.is_empty() {
        None
    } else {
        Some(outgoing)
    }
}

fn deliver_reply(twitch: &TwitchConnector, cleaner: &ReplyCleaner, reply: BotReply) {
    match render_reply(cleaner, &reply) {
        Some(outgoing) => {
            info!(
                censored = reply.is_censored,
                chars = outgoing.chars().count(),
                "Forwarding director reply to chat"
            );
            twitch.send_message(outgoing);
        }
        None => debug!("Dropping empty director reply"),
    }
}

// =============================================================================
// Tests
// =============================================================================
