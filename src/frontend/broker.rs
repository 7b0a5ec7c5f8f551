//! [`ShellApi`] over the shell's WebSocket.
//!
//! Speaks the shell's native-API envelopes (`extensions.dispatch`,
//! `app.exit`) and surfaces every frame the shell pushes back as an
//! [`InboundMessage`] on a [`ShellEvents`] channel.

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{ShellApi, ShellError};
use crate::extension::bootstrap::BROKER_HOST;
use crate::extension::envelope::{Envelope, InboundMessage};
use crate::transport::{self, Frame, WsReader};

/// Native method relaying an event to an extension.
pub const DISPATCH_METHOD: &str = "extensions.dispatch";
/// Native method terminating the application.
pub const EXIT_METHOD: &str = "app.exit";

/// Connection to the shell acting as its frontend.
pub struct BrokerShell {
    access_token: String,
    outbound: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Events the shell pushes to the frontend.
pub struct ShellEvents {
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl ShellEvents {
    /// Next message of any kind; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    /// Next message carrying `event`, skipping everything else.
    pub async fn recv_event(&mut self, event: &str) -> Option<InboundMessage> {
        while let Some(message) = self.inbound.recv().await {
            if message.is_event(event) {
                return Some(message);
            }
        }
        None
    }
}

impl BrokerShell {
    /// Frontend URL for a shell on `port`.
    pub fn client_url(port: u16, connect_token: Option<&str>) -> String {
        match connect_token {
            Some(token) => format!("ws://{BROKER_HOST}:{port}/?connectToken={token}"),
            None => format!("ws://{BROKER_HOST}:{port}/"),
        }
    }

    /// Connect to the shell at `url`.
    pub async fn connect(
        url: &str,
        access_token: impl Into<String>,
    ) -> Result<(Self, ShellEvents), ShellError> {
        let (sink, reader) = transport::connect(url).await.map_err(ShellError::Connect)?;
        tracing::debug!("connected to shell");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let shell = Self {
            access_token: access_token.into(),
            outbound,
            writer: transport::spawn_writer(sink, outbound_rx),
            reader: tokio::spawn(read_loop(reader, inbound_tx)),
        };
        Ok((shell, ShellEvents { inbound }))
    }

    /// Close the connection and wait for the writer to finish.
    pub async fn close(self) {
        let _ = self.outbound.send(Message::Close(None));
        let _ = self.writer.await;
        self.reader.abort();
    }

    fn call(&self, method: &str, data: Value) -> Result<(), ShellError> {
        let text = Envelope::new(method, self.access_token.as_str(), data).to_text()?;
        tracing::trace!(method, "sending native call");
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| ShellError::Disconnected)
    }
}

impl ShellApi for BrokerShell {
    fn dispatch(
        &self,
        extension_id: &str,
        event: &str,
        data: Value,
    ) -> impl Future<Output = Result<(), ShellError>> + Send {
        let result = self.call(
            DISPATCH_METHOD,
            json!({
                "extensionId": extension_id,
                "event": event,
                "data": data,
            }),
        );
        async move { result }
    }

    fn exit(&self) -> impl Future<Output = Result<(), ShellError>> + Send {
        let result = self.call(EXIT_METHOD, json!({ "code": 0 }));
        async move { result }
    }
}

async fn read_loop(mut reader: WsReader, inbound: mpsc::UnboundedSender<InboundMessage>) {
    while let Some(next) = reader.next().await {
        let text = match next.map(Frame::from) {
            Ok(Frame::Text(text)) => text,
            Ok(Frame::Control) => continue,
            Ok(Frame::Close(_)) => break,
            Err(err) => {
                tracing::error!(error = %err, "shell connection failed");
                break;
            }
        };

        if inbound.send(InboundMessage::decode(text)).is_err() {
            break;
        }
    }
    tracing::debug!("shell connection closed");
}
