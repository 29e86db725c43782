//! Concrete transports. Each owns its wire format; the router never sees it.

pub mod irc;
pub mod keybase;
