//! Error types for the bridge. Send failures live next to the transports (`relay::transport::SendError`).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::relay::event::Platform;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Startup failure of either transport. Always fatal.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {server}: {source}")]
    Io {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("tls: {0}")]
    Tls(String),

    #[error("IRC registration timed out")]
    Timeout,

    #[error("connection closed during IRC registration")]
    Closed,

    #[error("nickname {0} is already in use")]
    NickInUse(String),

    #[error("SASL authentication failed: {0}")]
    SaslFailed(String),

    #[error("server refused the connection: {0}")]
    Rejected(String),

    #[error("chat service unavailable: {0}")]
    ChatUnavailable(String),

    #[error("chat client is not logged in")]
    NotLoggedIn,
}

/// Failure inside a transport's listen loop.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Why the bridge stopped. The binary logs it and exits non-zero.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("{platform} event loop ended")]
    LoopEnded { platform: Platform },

    #[error("{platform} event loop failed: {source}")]
    LoopFailed {
        platform: Platform,
        #[source]
        source: TransportError,
    },
}

impl BridgeError {
    /// Map the result of a listen loop, which only ever returns when the bridge must stop.
    pub fn loop_ended(platform: Platform, result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => BridgeError::LoopEnded { platform },
            Err(source) => BridgeError::LoopFailed { platform, source },
        }
    }
}
