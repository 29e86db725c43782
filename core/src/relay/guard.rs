//! Loop guard: decides, before anything is relayed, whether an inbound event must be dropped.
//! Rules run in a fixed order per platform; the first one that fires wins.

use super::event::{BotIdentity, ContentKind, InboundEvent, Platform};
use super::registry::irc_eq;

/// Why the guard dropped an event. Logged, never surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Our own chat post echoing back from the chat service.
    OwnChatMessage,
    /// A line sent by our own IRC nick.
    OwnIrcMessage,
    /// Attachment, reaction or other non-text chat content.
    NotText,
    /// Line starting with a lone `#`, which chat users write to keep it off IRC.
    Comment,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::OwnChatMessage => "own_chat_message",
            DropReason::OwnIrcMessage => "own_irc_message",
            DropReason::NotText => "not_text",
            DropReason::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Drop(DropReason),
}

type Rule = fn(&BotIdentity, &InboundEvent) -> Option<DropReason>;

const CHAT_RULES: &[Rule] = &[own_chat_message, not_text, comment];
const IRC_RULES: &[Rule] = &[own_irc_message];

fn own_chat_message(id: &BotIdentity, ev: &InboundEvent) -> Option<DropReason> {
    (ev.sender == id.chat_username).then_some(DropReason::OwnChatMessage)
}

fn own_irc_message(id: &BotIdentity, ev: &InboundEvent) -> Option<DropReason> {
    irc_eq(&ev.sender, &id.irc_nick).then_some(DropReason::OwnIrcMessage)
}

fn not_text(_: &BotIdentity, ev: &InboundEvent) -> Option<DropReason> {
    (ev.kind != ContentKind::Text).then_some(DropReason::NotText)
}

fn comment(_: &BotIdentity, ev: &InboundEvent) -> Option<DropReason> {
    is_comment(&ev.text).then_some(DropReason::Comment)
}

/// First whitespace-delimited token is exactly `#`.
pub fn is_comment(text: &str) -> bool {
    text.split_whitespace().next() == Some("#")
}

#[derive(Debug, Clone)]
pub struct LoopGuard {
    identity: BotIdentity,
}

impl LoopGuard {
    pub fn new(identity: BotIdentity) -> Self {
        Self { identity }
    }

    pub fn check(&self, event: &InboundEvent) -> Verdict {
        let rules = match event.source {
            Platform::Chat => CHAT_RULES,
            Platform::Irc => IRC_RULES,
        };
        rules
            .iter()
            .find_map(|rule| rule(&self.identity, event))
            .map_or(Verdict::Continue, Verdict::Drop)
    }
}
