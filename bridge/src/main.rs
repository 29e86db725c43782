//! keyrc binary. Loads settings.json (or --config), applies env and flag overrides, then
//! relays until either side disconnects. Exits non-zero whenever the bridge stops.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keyrc_core::{bridge, config::Config};
use tracing::{error, info, Subscriber};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "keyrc", version, about = "Relay messages between a Keybase team and IRC")]
struct Cli {
    /// Settings file. Defaults to ./settings.json when present.
    #[arg(long, short, env = "KEYRC_CONFIG")]
    config: Option<PathBuf>,

    /// IRC server as host:port.
    #[arg(long)]
    server: Option<String>,

    /// IRC nick.
    #[arg(long)]
    nick: Option<String>,

    /// Keybase team to bridge.
    #[arg(long)]
    team: Option<String>,

    /// Topic that takes commands and is never relayed.
    #[arg(long)]
    control_topic: Option<String>,

    /// Connect to IRC over TLS.
    #[arg(long)]
    tls: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also append logs to this file (e.g. irc.log).
    #[arg(long, env = "KEYRC_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.irc.server = server.clone();
        }
        if let Some(nick) = &self.nick {
            config.irc.nick = nick.clone();
        }
        if let Some(team) = &self.team {
            config.chat.team = team.clone();
        }
        if let Some(topic) = &self.control_topic {
            config.chat.control_topic = topic.clone();
        }
        if self.tls {
            config.irc.tls = true;
        }
    }
}

/// Stdout layer, plus a plain-text layer appending to `log_file` when set.
fn build_subscriber(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Arc::new(file)).with_ansi(false).with_target(false))
        }
        None => None,
    };
    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    build_subscriber(&cli.log_level, cli.log_file.as_deref())?.init();

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        error!(error = %e, "failed to load config");
        e
    })?;
    config.apply_env();
    cli.apply(&mut config);

    info!(
        server = %config.irc.server,
        nick = %config.irc.nick,
        team = %config.chat.team,
        tls = config.irc.tls,
        "starting keyrc"
    );

    bridge::run(config).await.map_err(|e| {
        error!(error = %e, "bridge stopped");
        e.into()
    })
}
