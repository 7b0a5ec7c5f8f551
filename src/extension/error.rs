//! Error types for the extension host
//!
//! Each concern gets its own `thiserror` enum; binaries fold them into
//! `anyhow` at the top level.

use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised while discovering connection parameters at startup.
///
/// All of these are fatal: the process exits uninitialized.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Fewer positional arguments than the host needs
    #[error("expected at least {expected} startup arguments, got {found}")]
    MissingArguments {
        /// Number of arguments required
        expected: usize,
        /// Number of arguments supplied
        found: usize,
    },

    /// A positional argument was not of the form `key=value`
    #[error("startup argument {position} is not a key=value pair: {raw:?}")]
    MalformedArgument {
        /// Zero-based argument position
        position: usize,
        /// The argument as received
        raw: String,
    },

    /// The port could not be interpreted as a TCP port
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// Standard input closed before a complete JSON object arrived
    #[error("stdin closed before a complete connection object was received")]
    UnexpectedEof,

    /// Standard input could not be read
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Standard input did not contain the expected JSON object
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for bootstrap operations
pub type BootstrapResult<T> = std::result::Result<T, BootstrapError>;

/// Errors raised by the host's connection and receive loop.
#[derive(Debug, Error)]
pub enum HostError {
    /// The WebSocket handshake with the broker failed
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Broker URL that was dialled
        url: String,
        /// Underlying transport error
        #[source]
        source: tungstenite::Error,
    },

    /// The established connection failed mid-stream
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// Convenience result alias for host operations
pub type HostResult<T> = std::result::Result<T, HostError>;
