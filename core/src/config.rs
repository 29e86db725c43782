//! Bridge configuration. Built once at startup from settings.json, the environment and
//! CLI overrides, then passed by reference to everything that needs it.
//!
//! settings.json shape (every field optional):
//! ```json
//! {
//!   "irc":   { "server": "irc.libera.chat:6697", "nick": "keyrcbot", "tls": true, "password": "..." },
//!   "chat":  { "team": "keyrc", "control_topic": "general", "keybase_bin": "keybase" },
//!   "relay": { "nick_match": "case_insensitive", "nick_placeholder": "<bridge>",
//!              "discover_control_topic": false, "startup_notice": "Link starting" }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::relay::format::{NickMask, NickMatch};

/// Read from the working directory when no path is given.
pub const SETTINGS_FILE: &str = "settings.json";

/// IRC SASL password when settings.json has none.
pub const IRC_PASSWORD_ENV: &str = "IRC_PASS";

const DEFAULT_SERVER: &str = "irc.libera.chat:6667";
const DEFAULT_NICK: &str = "keyrcbot";
const DEFAULT_TEAM: &str = "keyrc";
const DEFAULT_CONTROL_TOPIC: &str = "general";
const DEFAULT_KEYBASE_BIN: &str = "keybase";
const DEFAULT_NICK_PLACEHOLDER: &str = "<bridge>";
const DEFAULT_STARTUP_NOTICE: &str = "Link starting";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub irc: IrcConfig,
    pub chat: ChatConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    /// `host:port`.
    pub server: String,
    pub nick: String,
    /// USER name and SASL account. Defaults to the nick.
    pub username: Option<String>,
    pub realname: Option<String>,
    /// SASL PLAIN password (the auth token).
    pub password: Option<String>,
    pub tls: bool,
    /// Use SASL when a password is set. Set false to connect without authenticating.
    pub sasl: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Team whose topics are bridged. Messages from other teams are ignored.
    pub team: String,
    /// Topic that only takes commands and is never bridged.
    pub control_topic: String,
    /// Path or name of the keybase CLI.
    pub keybase_bin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How the bot nick is matched when masking it in chat text sent to IRC.
    pub nick_match: NickMatch,
    /// Replacement for the bot nick in chat text sent to IRC.
    pub nick_placeholder: String,
    /// Offer the control topic to discovery (the registry still refuses to link it).
    pub discover_control_topic: bool,
    /// Posted to the control topic on startup. Empty disables it.
    pub startup_notice: String,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            nick: DEFAULT_NICK.to_string(),
            username: None,
            realname: None,
            password: None,
            tls: false,
            sasl: true,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            team: DEFAULT_TEAM.to_string(),
            control_topic: DEFAULT_CONTROL_TOPIC.to_string(),
            keybase_bin: DEFAULT_KEYBASE_BIN.to_string(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            nick_match: NickMatch::default(),
            nick_placeholder: DEFAULT_NICK_PLACEHOLDER.to_string(),
            discover_control_topic: false,
            startup_notice: DEFAULT_STARTUP_NOTICE.to_string(),
        }
    }
}

impl IrcConfig {
    /// Host part of `server`, used for TLS server name.
    pub fn host(&self) -> &str {
        match self.server.rsplit_once(':') {
            Some((host, _)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => &self.server,
        }
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.nick)
    }

    /// `(account, password)` when SASL should be attempted.
    pub fn sasl_credentials(&self) -> Option<(&str, &str)> {
        if !self.sasl {
            return None;
        }
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((self.username(), password))
    }
}

impl Config {
    /// Load `path`, or settings.json from the working directory if present, else defaults.
    /// An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(SETTINGS_FILE);
                if !p.exists() {
                    return Ok(Config::default());
                }
                p
            }
        };
        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Fill values the file left unset from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let has_password = self.irc.password.as_deref().is_some_and(|p| !p.is_empty());
        if !has_password {
            if let Some(p) = lookup(IRC_PASSWORD_ENV).filter(|p| !p.is_empty()) {
                self.irc.password = Some(p);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("irc.server", &self.irc.server),
            ("irc.nick", &self.irc.nick),
            ("chat.team", &self.chat.team),
            ("chat.control_topic", &self.chat.control_topic),
            ("chat.keybase_bin", &self.chat.keybase_bin),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        match self.irc.server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "irc.server {:?} must be host:port",
                    self.irc.server
                )))
            }
        }
        if self.irc.nick.contains(|c: char| c.is_whitespace() || c == ',' || c == ':') {
            return Err(ConfigError::Invalid(format!("irc.nick {:?} is not a valid nick", self.irc.nick)));
        }
        if let Some(username) = &self.irc.username {
            if username.contains(|c: char| c.is_whitespace() || c == '@') {
                return Err(ConfigError::Invalid(format!("irc.username {:?} is not a valid user name", username)));
            }
        }
        NickMask::new(&self.irc.nick, self.relay.nick_match, &self.relay.nick_placeholder)?;
        Ok(())
    }
}
