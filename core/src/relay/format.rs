//! Text formatting for relayed lines, and masking of the bot's IRC nick in chat text.

use std::borrow::Cow;

use regex::{NoExpand, Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::ConfigError;

/// `[<sender>]: <text>`, the shape of every relayed line in both directions.
pub fn relay_line(sender: &str, text: &str) -> String {
    format!("[{}]: {}", sender, text)
}

/// Confirmation posted into a freshly linked IRC channel.
pub fn connected_notice(irc_channel: &str) -> String {
    format!("Connected to {}!", irc_channel)
}

/// How occurrences of the bot nick are matched inside chat text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NickMatch {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

/// Replaces the bot's IRC nick in text forwarded to IRC so the line cannot highlight
/// or re-trigger the bot, and cannot come back verbatim on the next round trip.
#[derive(Debug, Clone)]
pub struct NickMask {
    /// None when the nick is empty (nothing to mask).
    pattern: Option<Regex>,
    placeholder: String,
}

impl NickMask {
    pub fn new(nick: &str, mode: NickMatch, placeholder: &str) -> Result<Self, ConfigError> {
        if nick.is_empty() {
            return Ok(Self {
                pattern: None,
                placeholder: placeholder.to_string(),
            });
        }
        let pattern = RegexBuilder::new(&regex::escape(nick))
            .case_insensitive(mode == NickMatch::CaseInsensitive)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("nick pattern: {}", e)))?;
        if pattern.is_match(placeholder) {
            return Err(ConfigError::Invalid(format!(
                "nick placeholder {:?} contains the nick {:?}",
                placeholder, nick
            )));
        }
        Ok(Self {
            pattern: Some(pattern),
            placeholder: placeholder.to_string(),
        })
    }

    pub fn mask<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.pattern {
            Some(p) => p.replace_all(text, NoExpand(&self.placeholder)),
            None => Cow::Borrowed(text),
        }
    }
}
