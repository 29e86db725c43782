//! Relay router: decides what happens to each inbound event and performs it.
//!
//! Chat side, in order: team scope > loop guard > control topic (commands, never relayed)
//! > linked topic lookup > relay to IRC with the bot nick masked.
//! IRC side: loop guard > per-channel relay rules installed when a link is created.
//!
//! `route` only decides (and appends links for `join`); `dispatch` also performs the
//! resulting effects through the transports. Send failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::commands::{Command, CommandInterpreter};
use super::event::{BotIdentity, InboundEvent, OutboundEvent, Platform};
use super::format::{connected_notice, relay_line, NickMask, NickMatch};
use super::guard::{LoopGuard, Verdict};
use super::log::truncate_content_default;
use super::registry::{irc_eq, ChannelLink, ChannelRegistry, Registration};
use super::transport::{ChatTransport, InboundSink, IrcTransport, Membership, SendError};
use crate::config::Config;
use crate::error::ConfigError;

/// Something the router wants done on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Join an IRC channel.
    Join(String),
    Send(OutboundEvent),
}

/// Relay rule for one IRC channel, installed when its link is created.
#[derive(Debug, Clone)]
pub struct IrcRelayRule {
    link: ChannelLink,
}

impl IrcRelayRule {
    pub fn new(link: ChannelLink) -> Self {
        Self { link }
    }

    pub fn channel(&self) -> &str {
        &self.link.irc_channel
    }

    pub fn matches(&self, event: &InboundEvent) -> bool {
        irc_eq(&event.channel, &self.link.irc_channel) && !event.text.is_empty()
    }

    pub fn apply(&self, event: &InboundEvent) -> OutboundEvent {
        OutboundEvent::to_chat(&self.link.chat_topic, relay_line(&event.sender, &event.text))
    }
}

/// The parts of the configuration the router reads.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub team: String,
    pub control_topic: String,
    pub nick_match: NickMatch,
    pub nick_placeholder: String,
    pub discover_control_topic: bool,
}

impl RouterSettings {
    /// Settings for `team` with the default relay options.
    pub fn new(team: impl Into<String>, control_topic: impl Into<String>) -> Self {
        let relay = crate::config::RelayConfig::default();
        Self {
            team: team.into(),
            control_topic: control_topic.into(),
            nick_match: relay.nick_match,
            nick_placeholder: relay.nick_placeholder,
            discover_control_topic: relay.discover_control_topic,
        }
    }
}

impl From<&Config> for RouterSettings {
    fn from(config: &Config) -> Self {
        Self {
            team: config.chat.team.clone(),
            control_topic: config.chat.control_topic.clone(),
            nick_match: config.relay.nick_match,
            nick_placeholder: config.relay.nick_placeholder.clone(),
            discover_control_topic: config.relay.discover_control_topic,
        }
    }
}

pub struct RelayRouter {
    team: String,
    discover_control_topic: bool,
    guard: LoopGuard,
    commands: CommandInterpreter,
    nick_mask: NickMask,
    registry: ChannelRegistry,
    rules: RwLock<Vec<IrcRelayRule>>,
    chat: Arc<dyn ChatTransport>,
    irc: Arc<dyn IrcTransport>,
}

impl RelayRouter {
    pub fn new(
        settings: RouterSettings,
        identity: BotIdentity,
        chat: Arc<dyn ChatTransport>,
        irc: Arc<dyn IrcTransport>,
    ) -> Result<Self, ConfigError> {
        let nick_mask = NickMask::new(&identity.irc_nick, settings.nick_match, &settings.nick_placeholder)?;
        Ok(Self {
            team: settings.team,
            discover_control_topic: settings.discover_control_topic,
            commands: CommandInterpreter::new(&identity, settings.control_topic.clone()),
            registry: ChannelRegistry::new(settings.control_topic),
            guard: LoopGuard::new(identity),
            nick_mask,
            rules: RwLock::new(Vec::new()),
            chat,
            irc,
        })
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// IRC channels with an installed relay rule, in installation order.
    pub fn rule_channels(&self) -> Vec<String> {
        self.rules.read().iter().map(|r| r.channel().to_string()).collect()
    }

    /// Decide what to do with `event`.
    pub fn route(&self, event: &InboundEvent) -> Vec<Effect> {
        match event.source {
            Platform::Chat => self.route_chat(event),
            Platform::Irc => self.route_irc(event),
        }
    }

    fn route_chat(&self, event: &InboundEvent) -> Vec<Effect> {
        if event.team.as_deref() != Some(self.team.as_str()) {
            debug!(platform = "chat", channel = %event.channel, team = ?event.team, "drop: outside bridged team");
            return Vec::new();
        }
        if let Verdict::Drop(reason) = self.guard.check(event) {
            debug!(platform = "chat", channel = %event.channel, from = %event.sender, reason = reason.as_str(), "drop");
            return Vec::new();
        }
        if self.registry.is_control_topic(&event.channel) {
            return match self.commands.parse(&event.text) {
                Some(Command::Join(topic)) => {
                    info!(from = %event.sender, topic = %topic, "join command");
                    self.link_topic(&topic)
                }
                None => Vec::new(),
            };
        }
        let Some(link) = self.registry.find_by_chat_topic(&event.channel) else {
            debug!(platform = "chat", channel = %event.channel, "drop: topic not linked");
            return Vec::new();
        };
        let text = self.irc_lines(&event.sender, &event.text);
        if text.is_empty() {
            return Vec::new();
        }
        vec![Effect::Send(OutboundEvent::to_irc(link.irc_channel, text))]
    }

    /// One `[sender]: line` per non-blank line of `text`, newline separated, with the bot
    /// nick masked everywhere in it (sender name included).
    fn irc_lines(&self, sender: &str, text: &str) -> String {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| self.nick_mask.mask(&relay_line(sender, l)).into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn route_irc(&self, event: &InboundEvent) -> Vec<Effect> {
        if let Verdict::Drop(reason) = self.guard.check(event) {
            debug!(platform = "irc", channel = %event.channel, from = %event.sender, reason = reason.as_str(), "drop");
            return Vec::new();
        }
        self.rules
            .read()
            .iter()
            .filter(|rule| rule.matches(event))
            .map(|rule| Effect::Send(rule.apply(event)))
            .collect()
    }

    /// Link `topic`: register it, install its IRC relay rule, join and confirm.
    /// An already linked topic is only confirmed again.
    pub fn link_topic(&self, topic: &str) -> Vec<Effect> {
        match self.registry.register(topic) {
            Registration::Inserted(link) => {
                self.rules.write().push(IrcRelayRule::new(link.clone()));
                info!(topic = %link.chat_topic, channel = %link.irc_channel, "link created");
                let notice = connected_notice(&link.irc_channel);
                vec![
                    Effect::Join(link.irc_channel.clone()),
                    Effect::Send(OutboundEvent::to_irc(link.irc_channel, notice)),
                ]
            }
            Registration::Existing(link) => {
                let notice = connected_notice(&link.irc_channel);
                vec![Effect::Send(OutboundEvent::to_irc(link.irc_channel, notice))]
            }
            Registration::Reserved => {
                debug!(topic = %topic, "not linking the control topic");
                Vec::new()
            }
            Registration::Invalid => {
                warn!(topic = %topic, "not linking: unusable as an IRC channel name");
                Vec::new()
            }
            Registration::Conflict(existing) => {
                warn!(
                    topic = %topic,
                    channel = %existing.irc_channel,
                    linked_topic = %existing.chat_topic,
                    "not linking: IRC channel already linked to another topic"
                );
                Vec::new()
            }
        }
    }

    /// Route `event` and perform the effects on the task that received it.
    pub async fn dispatch(&self, event: InboundEvent) {
        info!(
            platform = %event.source,
            channel = %event.channel,
            from = %event.sender,
            direction = "incoming",
            content = %truncate_content_default(&event.text),
            "inbound"
        );
        let effects = self.route(&event);
        self.perform(effects).await;
    }

    pub async fn perform(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Join(channel) => {
                    if let Err(e) = self.irc.join(&channel).await {
                        error!(platform = "irc", channel = %channel, error = %e, "join failed");
                    }
                }
                Effect::Send(out) => self.send(out).await,
            }
        }
    }

    async fn send(&self, out: OutboundEvent) {
        let result: Result<(), SendError> = match out.target {
            Platform::Chat => self.chat.send(&out.channel, &out.text).await,
            Platform::Irc => self.irc.send(&out.channel, &out.text).await,
        };
        match result {
            Ok(()) => debug!(
                platform = %out.target,
                channel = %out.channel,
                direction = "outgoing",
                content = %truncate_content_default(&out.text),
                "sent"
            ),
            Err(e) => error!(
                platform = %out.target,
                channel = %out.channel,
                direction = "outgoing",
                content = %truncate_content_default(&out.text),
                error = %e,
                "send failed"
            ),
        }
    }

    /// Post `notice` to the control topic. Empty notice is skipped.
    pub async fn announce_startup(&self, notice: &str) {
        if notice.is_empty() {
            return;
        }
        let topic = self.registry.control_topic().to_string();
        self.send(OutboundEvent::to_chat(topic, notice)).await;
    }

    /// Link every existing topic of the bridged team. Returns how many links were created.
    /// A failed listing is logged and leaves the registry empty.
    pub async fn discover(&self) -> usize {
        let channels = match self.chat.list_channels().await {
            Ok(c) => c,
            Err(e) => {
                error!(platform = "chat", error = %e, "channel discovery failed; waiting for join commands");
                return 0;
            }
        };
        let mut linked = 0;
        for channel in channels {
            if channel.membership != Membership::Team || channel.team != self.team {
                continue;
            }
            if !self.discover_control_topic && self.registry.is_control_topic(&channel.topic) {
                continue;
            }
            let effects = self.link_topic(&channel.topic);
            if effects.iter().any(|e| matches!(e, Effect::Join(_))) {
                linked += 1;
            }
            self.perform(effects).await;
        }
        linked
    }
}

#[async_trait]
impl InboundSink for RelayRouter {
    async fn deliver(&self, event: InboundEvent) {
        self.dispatch(event).await;
    }
}
