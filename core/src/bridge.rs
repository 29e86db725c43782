//! Bridge startup and main loop.
//!
//! Startup order: validate config > keybase login check > IRC registration > router >
//! startup notice > topic discovery > both listen loops. Either loop ending stops the bridge.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::BridgeError;
use crate::relay::channels::{irc, keybase::KeybaseChat};
use crate::relay::event::{BotIdentity, Platform};
use crate::relay::router::{RelayRouter, RouterSettings};
use crate::relay::transport::{ChatTransport, InboundSink, IrcTransport};

/// Connect both sides and relay until one of them goes away. Only returns on failure.
pub async fn run(config: Config) -> Result<(), BridgeError> {
    config.validate()?;

    let chat = Arc::new(KeybaseChat::connect(&config.chat).await?);
    let (irc_handle, irc_loop) = irc::connect(&config.irc).await?;

    let identity = BotIdentity::new(chat.username(), irc_handle.nick());
    info!(chat_user = %identity.chat_username, irc_nick = %identity.irc_nick, team = %config.chat.team, "bridge identity");

    let chat_transport: Arc<dyn ChatTransport> = chat.clone();
    let irc_transport: Arc<dyn IrcTransport> = Arc::new(irc_handle);
    let router = Arc::new(RelayRouter::new(
        RouterSettings::from(&config),
        identity,
        chat_transport,
        irc_transport,
    )?);

    router.announce_startup(&config.relay.startup_notice).await;
    let linked = router.discover().await;
    info!(linked, control_topic = %config.chat.control_topic, "startup complete; relaying");

    let sink: Arc<dyn InboundSink> = router;
    let chat_loop = chat.listen(sink.clone());
    let irc_loop = irc_loop.run(sink);

    tokio::select! {
        result = chat_loop => Err(BridgeError::loop_ended(Platform::Chat, result)),
        result = irc_loop => Err(BridgeError::loop_ended(Platform::Irc, result)),
    }
}
