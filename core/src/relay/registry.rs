//! Channel registry: the set of active chat topic <-> IRC channel links.
//! Append-only for the life of the process. The control topic can never be linked.
//! IRC channel names compare with rfc1459 case mapping, chat topics compare exactly.

use std::collections::HashMap;

use parking_lot::RwLock;

/// One bridged pair. `irc_channel` is always `#` + the sanitized topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelLink {
    pub chat_topic: String,
    pub irc_channel: String,
}

impl ChannelLink {
    /// Derive the link for `topic`. None if the sanitized topic is not usable as an IRC channel name.
    pub fn derive(topic: &str) -> Option<Self> {
        let topic = sanitize_topic(topic);
        if !is_valid_channel_body(topic) {
            return None;
        }
        Some(Self {
            chat_topic: topic.to_string(),
            irc_channel: format!("#{}", topic),
        })
    }
}

/// Strip the leading `#`s users tend to type (`join #devops`).
pub fn sanitize_topic(topic: &str) -> &str {
    topic.trim_start_matches('#')
}

/// Space, comma and BEL are illegal in IRC channel names; other control chars would break the line.
fn is_valid_channel_body(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c == ' ' || c == ',' || c.is_control())
}

/// rfc1459 lowercase: ASCII letters plus `[]\~` -> `{}|^`.
pub fn irc_fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// IRC case-insensitive equality (nicks and channel names).
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && irc_fold(a) == irc_fold(b)
}

/// Outcome of [`ChannelRegistry::register`]. Only `Inserted` changed the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Inserted(ChannelLink),
    /// Topic was already linked; the stored link is returned unchanged.
    Existing(ChannelLink),
    /// Topic is the control topic.
    Reserved,
    /// Topic is empty after sanitizing or cannot be an IRC channel name.
    Invalid,
    /// Derived IRC channel already belongs to another topic (e.g. `Dev` vs `dev`).
    Conflict(ChannelLink),
}

impl Registration {
    /// The link now active for the topic, if any.
    pub fn link(&self) -> Option<&ChannelLink> {
        match self {
            Registration::Inserted(l) | Registration::Existing(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Registration::Inserted(_))
    }
}

#[derive(Default)]
struct Links {
    /// Insertion order.
    ordered: Vec<ChannelLink>,
    by_topic: HashMap<String, usize>,
    /// Keyed by `irc_fold(irc_channel)`.
    by_irc: HashMap<String, usize>,
}

pub struct ChannelRegistry {
    control_topic: String,
    links: RwLock<Links>,
}

impl ChannelRegistry {
    pub fn new(control_topic: impl Into<String>) -> Self {
        Self {
            control_topic: control_topic.into(),
            links: RwLock::new(Links::default()),
        }
    }

    pub fn control_topic(&self) -> &str {
        &self.control_topic
    }

    pub fn is_control_topic(&self, topic: &str) -> bool {
        topic == self.control_topic
    }

    /// Link `topic` to its IRC channel. Idempotent; never fails, see [`Registration`] for the outcomes.
    pub fn register(&self, topic: &str) -> Registration {
        if self.is_control_topic(sanitize_topic(topic)) {
            return Registration::Reserved;
        }
        let Some(link) = ChannelLink::derive(topic) else {
            return Registration::Invalid;
        };
        let irc_key = irc_fold(&link.irc_channel);

        let mut links = self.links.write();
        if let Some(&i) = links.by_topic.get(&link.chat_topic) {
            return Registration::Existing(links.ordered[i].clone());
        }
        if let Some(&i) = links.by_irc.get(&irc_key) {
            return Registration::Conflict(links.ordered[i].clone());
        }
        let i = links.ordered.len();
        links.by_topic.insert(link.chat_topic.clone(), i);
        links.by_irc.insert(irc_key, i);
        links.ordered.push(link.clone());
        Registration::Inserted(link)
    }

    pub fn find_by_chat_topic(&self, topic: &str) -> Option<ChannelLink> {
        let links = self.links.read();
        links.by_topic.get(topic).map(|&i| links.ordered[i].clone())
    }

    pub fn find_by_irc_channel(&self, name: &str) -> Option<ChannelLink> {
        let links = self.links.read();
        links.by_irc.get(&irc_fold(name)).map(|&i| links.ordered[i].clone())
    }

    /// Snapshot of every link in insertion order.
    pub fn all(&self) -> Vec<ChannelLink> {
        self.links.read().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.links.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let reg = ChannelRegistry::new("general");
        let first = reg.register("random");
        let second = reg.register("random");
        assert!(first.is_inserted());
        assert_eq!(second, Registration::Existing(first.link().unwrap().clone()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn register_derives_hash_prefixed_channel() {
        let reg = ChannelRegistry::new("general");
        let link = reg.register("#devops").link().cloned().unwrap();
        assert_eq!(link.chat_topic, "devops");
        assert_eq!(link.irc_channel, "#devops");
        assert_eq!(reg.register("devops").link(), Some(&link));
    }

    #[test]
    fn control_topic_is_reserved() {
        let reg = ChannelRegistry::new("general");
        assert_eq!(reg.register("general"), Registration::Reserved);
        assert_eq!(reg.register("#general"), Registration::Reserved);
        assert!(reg.is_empty());
    }

    #[test]
    fn unusable_names_are_invalid() {
        let reg = ChannelRegistry::new("general");
        assert_eq!(reg.register(""), Registration::Invalid);
        assert_eq!(reg.register("##"), Registration::Invalid);
        assert_eq!(reg.register("a,b"), Registration::Invalid);
        assert_eq!(reg.register("bell\x07"), Registration::Invalid);
        assert!(reg.is_empty());
    }

    #[test]
    fn case_folded_irc_collision_is_a_conflict() {
        let reg = ChannelRegistry::new("general");
        let dev = reg.register("dev").link().cloned().unwrap();
        assert_eq!(reg.register("DEV"), Registration::Conflict(dev));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookups_by_either_side() {
        let reg = ChannelRegistry::new("general");
        reg.register("random");
        reg.register("devops");
        assert_eq!(reg.find_by_irc_channel("#RANDOM").unwrap().chat_topic, "random");
        assert_eq!(reg.find_by_chat_topic("devops").unwrap().irc_channel, "#devops");
        assert!(reg.find_by_chat_topic("nope").is_none());
        let order: Vec<_> = reg.all().into_iter().map(|l| l.chat_topic).collect();
        assert_eq!(order, ["random", "devops"]);
    }

    #[test]
    fn irc_fold_uses_rfc1459_mapping() {
        assert_eq!(irc_fold("#Chan[1]"), "#chan{1}");
        assert!(irc_eq("Nick\\Away", "nick|away"));
        assert!(!irc_eq("nick", "nick_"));
    }
}
