//! Relay between one Keybase team and IRC: chat topic `foo` <-> IRC channel `#foo`.
//! Transports live in `channels` (keybase CLI only in channels::keybase, sockets only in channels::irc).
//! The router decides; transports only move bytes. Commands come in through the control topic.
//! Log fields: platform=... channel=... from=... direction=... content=...

pub mod channels;
pub mod commands;
pub mod event;
pub mod format;
pub mod guard;
pub mod log;
pub mod registry;
pub mod router;
pub mod transport;

pub use channels::{irc, keybase};
pub use event::{BotIdentity, ContentKind, InboundEvent, OutboundEvent, Platform};
pub use registry::{ChannelLink, ChannelRegistry, Registration};
pub use router::{Effect, RelayRouter, RouterSettings};
pub use transport::{ChatTransport, InboundSink, IrcTransport, SendError};
