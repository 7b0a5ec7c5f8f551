//! Shell extension host – attach a helper process to a desktop app shell
//!
//! This crate implements both ends of the shell's extension channel:
//! - Connection bootstrap from startup arguments or a stdin handshake object
//! - A single-socket message loop that dispatches `runBun` function calls
//! - Example functions pushing immediate and long-running results
//! - A frontend shim that dispatches calls into the extension

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Extension-side modules
pub mod extension;

/// Frontend-side shim and shell client
pub mod frontend;

/// WebSocket plumbing shared by both sides
pub mod transport;

// Re-export key types for convenience
pub use extension::{ConnectionParams, ExtensionHost, HostOptions};
pub use frontend::FrontendShim;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
