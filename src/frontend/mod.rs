//! Frontend shim
//!
//! The UI side of the extension protocol: turn a local function call into a
//! `runBun` event dispatched to the extension, and ask the shell to shut the
//! extension and the app down. Results are not returned here; they arrive
//! later as separate `pingResult` events.

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::extension::envelope::{FunctionCall, events};

pub mod broker;

pub use broker::{BrokerShell, ShellEvents};

/// Extension id the shim addresses unless told otherwise.
pub const DEFAULT_EXTENSION_ID: &str = "extBun";

/// Errors produced while talking to the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The WebSocket handshake with the shell failed
    #[error("failed to connect to shell: {0}")]
    Connect(#[source] tungstenite::Error),
    /// The connection to the shell is gone
    #[error("shell connection closed")]
    Disconnected,
    /// A request could not be encoded
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The shell's native primitives the shim relies on.
pub trait ShellApi {
    /// Dispatch `event` with `data` to the extension registered as `extension_id`.
    fn dispatch(
        &self,
        extension_id: &str,
        event: &str,
        data: Value,
    ) -> impl Future<Output = Result<(), ShellError>> + Send;

    /// Ask the shell to terminate the whole application.
    fn exit(&self) -> impl Future<Output = Result<(), ShellError>> + Send;
}

/// Calls extension functions through a [`ShellApi`].
#[derive(Debug)]
pub struct FrontendShim<S> {
    shell: S,
    extension_id: String,
    debug: bool,
}

impl<S: ShellApi> FrontendShim<S> {
    /// Shim addressing [`DEFAULT_EXTENSION_ID`].
    pub fn new(shell: S, debug: bool) -> Self {
        Self::with_extension_id(shell, DEFAULT_EXTENSION_ID, debug)
    }

    /// Shim addressing a specific extension id.
    pub fn with_extension_id(shell: S, extension_id: impl Into<String>, debug: bool) -> Self {
        Self {
            shell,
            extension_id: extension_id.into(),
            debug,
        }
    }

    /// Give back the underlying shell.
    pub fn into_shell(self) -> S {
        self.shell
    }

    /// Call an extension function. Fire-and-forget: no result is returned.
    pub async fn run(&self, function: &str, parameter: Value) -> Result<(), ShellError> {
        let data = serde_json::to_value(FunctionCall::new(function, parameter))?;
        if self.debug {
            tracing::info!(
                "EXT: Calling {}.{} : {}",
                self.extension_id,
                events::RUN_FUNCTION,
                data
            );
        }

        self.shell
            .dispatch(&self.extension_id, events::RUN_FUNCTION, data)
            .await
    }

    /// Stop the extension, then the app.
    ///
    /// For shells running without a window, where no close event would
    /// otherwise reach the extension.
    pub async fn stop(&self) -> Result<(), ShellError> {
        if self.debug {
            tracing::info!("EXT: Calling {}.{}", self.extension_id, events::APP_CLOSE);
        }

        self.shell
            .dispatch(
                &self.extension_id,
                events::APP_CLOSE,
                Value::String(String::new()),
            )
            .await?;
        self.shell.exit().await
    }
}
