//! Relay events: what a transport hands the router, and what the router hands back.
//! Both are short-lived; nothing here outlives a single dispatch.

use std::fmt;

/// Side of the bridge an event came from or is headed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Chat,
    Irc,
}

impl Platform {
    /// Short id used in logs (e.g. "chat", "irc").
    pub fn id(&self) -> &'static str {
        match self {
            Platform::Chat => "chat",
            Platform::Irc => "irc",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// What kind of content a chat message carries. Only `Text` is ever relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    /// Attachments, reactions, edits, system messages.
    Other,
}

/// One message received by either transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub source: Platform,
    /// Chat username or IRC nick.
    pub sender: String,
    /// Chat topic name or IRC channel name (with its `#`).
    pub channel: String,
    /// Team the chat conversation belongs to. Always `None` for IRC.
    pub team: Option<String>,
    pub text: String,
    pub kind: ContentKind,
}

impl InboundEvent {
    /// Text message posted in `topic` of `team` on the chat side.
    pub fn chat(
        team: impl Into<String>,
        topic: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source: Platform::Chat,
            sender: sender.into(),
            channel: topic.into(),
            team: Some(team.into()),
            text: text.into(),
            kind: ContentKind::Text,
        }
    }

    /// PRIVMSG to `channel` on the IRC side.
    pub fn irc(channel: impl Into<String>, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: Platform::Irc,
            sender: sender.into(),
            channel: channel.into(),
            team: None,
            text: text.into(),
            kind: ContentKind::Text,
        }
    }

    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A send the router wants performed on one side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub target: Platform,
    /// Chat topic name or IRC channel name.
    pub channel: String,
    pub text: String,
}

impl OutboundEvent {
    pub fn to_irc(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target: Platform::Irc,
            channel: channel.into(),
            text: text.into(),
        }
    }

    pub fn to_chat(topic: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target: Platform::Chat,
            channel: topic.into(),
            text: text.into(),
        }
    }
}

/// Who the bridge is on each platform. Fixed once both transports are connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub chat_username: String,
    pub irc_nick: String,
}

impl BotIdentity {
    pub fn new(chat_username: impl Into<String>, irc_nick: impl Into<String>) -> Self {
        Self {
            chat_username: chat_username.into(),
            irc_nick: irc_nick.into(),
        }
    }

    /// The mention that addresses the bot in chat: `@<chat_username>`.
    pub fn chat_mention(&self) -> String {
        format!("@{}", self.chat_username)
    }
}
