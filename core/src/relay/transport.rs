//! Transport abstraction: what the router needs from each side of the bridge.
//! Concrete transports live in `relay::channels`; the router only sees these traits.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::event::InboundEvent;
use crate::error::TransportError;

/// Error from sending a message or joining a channel. Logged by the router; never fatal.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection's writer is gone (socket closed).
    #[error("not connected")]
    NotConnected,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The service answered with an error (bad channel, permission, etc.).
    #[error("{0}")]
    Other(String),
}

/// How the bot belongs to a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// A topic channel of a team.
    Team,
    /// Direct or group conversation outside any team.
    Direct,
}

/// A chat conversation the bot is a member of, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChannel {
    pub team: String,
    pub topic: String,
    pub membership: Membership,
}

/// Receives inbound events from a transport's listen loop. Called inline; no queue in between.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn deliver(&self, event: InboundEvent);
}

/// Chat service side of the bridge.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Username the bot posts as.
    fn username(&self) -> &str;

    /// Post `text` to `topic` of the configured team.
    async fn send(&self, topic: &str, text: &str) -> Result<(), SendError>;

    /// Conversations the bot belongs to. Used once at startup for discovery.
    async fn list_channels(&self) -> Result<Vec<ChatChannel>, SendError>;

    /// Feed every inbound chat message to `sink` until the event stream ends.
    async fn listen(&self, sink: Arc<dyn InboundSink>) -> Result<(), TransportError>;
}

/// IRC side of the bridge. Event delivery is driven by the connection's own loop.
#[async_trait]
pub trait IrcTransport: Send + Sync {
    /// Nick the bot registered with.
    fn nick(&self) -> &str;

    async fn join(&self, channel: &str) -> Result<(), SendError>;

    /// Send `text` to `channel`; multi-line text goes out as several lines.
    async fn send(&self, channel: &str, text: &str) -> Result<(), SendError>;
}

/// Split text into chunks of at most `max_len` bytes, preferring to break after a newline,
/// then after a space. Never splits a UTF-8 character. Chunks keep their separator.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (chunk, next) = if rest.len() <= max_len {
            (rest, "")
        } else {
            let mut cut = max_len;
            while cut > 0 && !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut == 0 {
                cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
            }
            let slice = &rest[..cut];
            let break_at = slice
                .rfind('\n')
                .or_else(|| slice.rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(cut);
            rest.split_at(break_at)
        };
        chunks.push(chunk.to_string());
        rest = next;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn breaks_at_newline_then_space() {
        assert_eq!(chunk_message("aaaa\nbbbb cccc", 10), vec!["aaaa\n", "bbbb cccc"]);
        assert_eq!(chunk_message("aaaa bbbb cccc", 10), vec!["aaaa bbbb ", "cccc"]);
    }

    #[test]
    fn hard_cut_without_separators() {
        assert_eq!(chunk_message("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn never_splits_a_character() {
        let chunks = chunk_message("ééééé", 3);
        assert_eq!(chunks, vec!["é", "é", "é", "é", "é"]);
        assert_eq!(chunk_message("€", 1), vec!["€"]);
    }
}
