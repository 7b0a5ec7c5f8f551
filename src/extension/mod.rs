//! Extension host
//!
//! This module provides everything the extension side needs: connection
//! bootstrap, the wire envelope, the single-socket message loop and the
//! example function handlers.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

// Submodules
pub mod bootstrap;
pub mod envelope;
pub mod error;
pub mod functions;
pub mod host;
pub mod traffic;

pub use bootstrap::ConnectionParams;
pub use envelope::{Envelope, FunctionCall, InboundMessage};
pub use error::{BootstrapError, HostError};
pub use functions::AppFunctions;
pub use host::{ConnectionState, ExtensionHost, MessageSender, Session};

/// Environment variable toggling traffic logging
pub const ENV_DEBUG: &str = "EXT_DEBUG";
/// Environment variable toggling ANSI colours in traffic logs
pub const ENV_TERM_COLORS: &str = "EXT_TERM_COLORS";
/// Environment variable toggling termination on window/app close
pub const ENV_TERM_ON_WINDOW_CLOSE: &str = "EXT_TERM_ON_WINDOW_CLOSE";
/// Environment variable overriding the long-running task interval (ms)
pub const ENV_LONG_RUN_INTERVAL_MS: &str = "EXT_LONG_RUN_INTERVAL_MS";

/// Configuration for the extension host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOptions {
    /// Log every frame in and out
    pub debug: bool,

    /// Colour traffic log lines
    pub term_colors: bool,

    /// Stop the loop when the shell announces window/app close
    pub terminate_on_window_close: bool,

    /// Delay between progress events of the long-running function
    pub long_run_interval: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            debug: true,
            term_colors: true,
            terminate_on_window_close: true,
            long_run_interval: Duration::from_secs(1),
        }
    }
}

impl HostOptions {
    /// Defaults overridden by `EXT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(flag) = lookup_flag(&lookup, ENV_DEBUG) {
            options.debug = flag;
        }
        if let Some(flag) = lookup_flag(&lookup, ENV_TERM_COLORS) {
            options.term_colors = flag;
        }
        if let Some(flag) = lookup_flag(&lookup, ENV_TERM_ON_WINDOW_CLOSE) {
            options.terminate_on_window_close = flag;
        }
        if let Some(raw) = lookup(ENV_LONG_RUN_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => options.long_run_interval = Duration::from_millis(ms),
                _ => {
                    tracing::warn!(key = ENV_LONG_RUN_INTERVAL_MS, value = %raw, "ignoring invalid interval")
                }
            }
        }

        options
    }
}

fn lookup_flag<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid boolean");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_without_overrides() {
        let options = HostOptions::from_lookup(|_| None);
        assert_eq!(options, HostOptions::default());
        assert!(options.debug);
        assert_eq!(options.long_run_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DEBUG, "off"),
            (ENV_TERM_COLORS, "0"),
            (ENV_TERM_ON_WINDOW_CLOSE, "FALSE"),
            (ENV_LONG_RUN_INTERVAL_MS, "250"),
        ]
        .into_iter()
        .collect();

        let options = HostOptions::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert!(!options.debug);
        assert!(!options.term_colors);
        assert!(!options.terminate_on_window_close);
        assert_eq!(options.long_run_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let options = HostOptions::from_lookup(|key| match key {
            ENV_DEBUG => Some("maybe".to_string()),
            ENV_LONG_RUN_INTERVAL_MS => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(options, HostOptions::default());
    }
}
