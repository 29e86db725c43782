//! Control-topic commands. The only directive is `@<bot> join <topic>`; anything else
//! posted to the control topic is ignored.

use super::event::BotIdentity;
use super::registry::sanitize_topic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Link `topic` to its IRC channel.
    Join(String),
}

pub struct CommandInterpreter {
    mention: String,
    control_topic: String,
}

impl CommandInterpreter {
    pub fn new(identity: &BotIdentity, control_topic: impl Into<String>) -> Self {
        Self {
            mention: identity.chat_mention(),
            control_topic: control_topic.into(),
        }
    }

    /// Parse a control-topic message: exactly three tokens split on single spaces,
    /// `@<bot> join <topic>`. A join of the control topic itself yields None.
    pub fn parse(&self, text: &str) -> Option<Command> {
        let parts: Vec<&str> = text.split(' ').collect();
        let [mention, verb, topic] = parts.as_slice() else {
            return None;
        };
        if *mention != self.mention || *verb != "join" {
            return None;
        }
        if sanitize_topic(topic) == self.control_topic {
            return None;
        }
        Some(Command::Join(topic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> CommandInterpreter {
        CommandInterpreter::new(&BotIdentity::new("keyrc", "keyrcbot"), "general")
    }

    #[test]
    fn parses_join() {
        assert_eq!(interpreter().parse("@keyrc join devops"), Some(Command::Join("devops".into())));
        assert_eq!(interpreter().parse("@keyrc join #devops"), Some(Command::Join("#devops".into())));
    }

    #[test]
    fn rejects_self_link() {
        assert_eq!(interpreter().parse("@keyrc join general"), None);
        assert_eq!(interpreter().parse("@keyrc join #general"), None);
    }

    #[test]
    fn requires_exact_shape() {
        let i = interpreter();
        assert_eq!(i.parse("@keyrc join"), None);
        assert_eq!(i.parse("@keyrc join devops now"), None);
        assert_eq!(i.parse("@keyrc  join devops"), None);
        assert_eq!(i.parse("@keyrc part devops"), None);
        assert_eq!(i.parse("@someone join devops"), None);
        assert_eq!(i.parse("keyrc join devops"), None);
        assert_eq!(i.parse("@keyrc JOIN devops"), None);
    }
}
