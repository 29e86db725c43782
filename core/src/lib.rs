//! keyrc core: relay router, channel registry, loop guard, Keybase chat and IRC transports.
//! The binary only parses flags, sets up logging and calls `bridge::run`.

pub mod bridge;
pub mod config;
pub mod error;
pub mod relay;
