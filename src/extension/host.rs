//! Extension host message loop
//!
//! The host owns the one socket to the shell's broker. Construction is
//! synchronous; [`ExtensionHost::connect`] performs the handshake and hands
//! back a [`Session`] whose [`Session::run`] drives the receive loop.
//!
//! State machine: `Created -> Connecting -> Open -> Closed`. `Closed` is
//! terminal; nothing reconnects.

use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::HostOptions;
use super::bootstrap::ConnectionParams;
use super::envelope::{Envelope, InboundMessage};
use super::error::{HostError, HostResult};
use super::traffic::TrafficLog;
use crate::transport::{self, Frame, WsReader};

/// Upper bound on waiting for the writer to flush the final close frame.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Host built, not yet dialled
    Created,
    /// WebSocket handshake in progress
    Connecting,
    /// Frames may be sent and received
    Open,
    /// Connection ended; terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Created => "created",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Shared {
    access_token: String,
    state: RwLock<ConnectionState>,
    outbound: mpsc::UnboundedSender<Message>,
    traffic: TrafficLog,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        let previous = *state;
        tracing::debug!(from = %previous, to = %next, "connection state change");
        *state = next;
    }
}

/// Cloneable handle for pushing events to the shell.
///
/// Handlers and the tasks they spawn keep one of these; all clones share the
/// host's connection state.
#[derive(Clone)]
pub struct MessageSender {
    shared: Arc<Shared>,
}

impl fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSender")
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl MessageSender {
    /// Broadcast `event` with `data` to the app.
    ///
    /// The envelope is only handed to the socket while the connection is
    /// open. Otherwise a warning is logged and the message is dropped; it is
    /// never queued for later. Returns whether the frame was handed off.
    pub fn send_message(&self, event: &str, data: Value) -> bool {
        let state = self.shared.state();
        if state != ConnectionState::Open {
            tracing::warn!(%state, event, "WebSocket send: socket is not connected");
            return false;
        }

        let envelope = Envelope::broadcast(self.shared.access_token.as_str(), event, data);
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, event, "failed to encode envelope");
                return false;
            }
        };

        if self.shared.outbound.send(Message::Text(text.clone())).is_err() {
            tracing::warn!(event, "WebSocket send: writer has stopped");
            return false;
        }

        self.shared.traffic.outbound(&text);
        true
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }
}

/// Extension side of the broker connection, before it is opened.
pub struct ExtensionHost {
    params: ConnectionParams,
    options: HostOptions,
    shared: Arc<Shared>,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
}

impl ExtensionHost {
    /// Build a host in the `Created` state. No I/O happens here.
    pub fn new(params: ConnectionParams, options: HostOptions) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            access_token: params.token.clone(),
            state: RwLock::new(ConnectionState::Created),
            outbound,
            traffic: TrafficLog::new(options.debug, options.term_colors),
        });

        tracing::info!(
            extension = %params.extension_id,
            port = params.port,
            "{} running on port {}",
            params.extension_id,
            params.port
        );

        Self {
            params,
            options,
            shared,
            outbound_rx,
        }
    }

    /// Handle for sending events; usable before and after connecting.
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Dial the broker and return an open session.
    ///
    /// A failed handshake leaves the host `Closed`; there is no retry.
    pub async fn connect(self) -> HostResult<Session> {
        let url = self.params.socket_url();
        self.shared.set_state(ConnectionState::Connecting);

        match transport::connect(&url).await {
            Ok((sink, reader)) => {
                self.shared.set_state(ConnectionState::Open);
                tracing::info!("WebSocket ready");
                tracing::info!(port = self.params.port, "Running on port {}", self.params.port);

                let writer = transport::spawn_writer(sink, self.outbound_rx);
                Ok(Session {
                    shared: self.shared,
                    options: self.options,
                    reader,
                    writer,
                })
            }
            Err(source) => {
                self.shared.set_state(ConnectionState::Closed);
                tracing::error!(
                    port = self.params.port,
                    error = %source,
                    "WebSocket Error: {}",
                    source
                );
                Err(HostError::Connect {
                    url: redact_connect_token(&url),
                    source,
                })
            }
        }
    }

    /// Connect, then run the receive loop until the connection ends.
    pub async fn run<F>(self, on_message: F) -> HostResult<()>
    where
        F: FnMut(InboundMessage),
    {
        self.connect().await?.run(on_message).await
    }
}

/// An open broker connection.
pub struct Session {
    shared: Arc<Shared>,
    options: HostOptions,
    reader: WsReader,
    writer: JoinHandle<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.shared.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Handle for sending events on this connection.
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Receive loop.
    ///
    /// Every decoded frame goes to `on_message`, including frames that are not
    /// JSON. When shutdown filtering is enabled, a `windowClose`/`appClose`
    /// notification is not dispatched; the host closes its side and returns.
    /// Returns `Ok` after a close or end of stream, `Err` on a transport error.
    pub async fn run<F>(mut self, mut on_message: F) -> HostResult<()>
    where
        F: FnMut(InboundMessage),
    {
        let result = loop {
            let Some(next) = self.reader.next().await else {
                tracing::info!("WebSocket closed: stream ended");
                break Ok(());
            };

            let frame = match next {
                Ok(message) => Frame::from(message),
                Err(err) => {
                    tracing::error!(error = %err, "WebSocket Error: {}", err);
                    break Err(HostError::Transport(err));
                }
            };

            let text = match frame {
                Frame::Text(text) => text,
                Frame::Close(details) => {
                    let (code, reason) = details.unwrap_or((1005, String::new()));
                    tracing::info!(code, %reason, "WebSocket closed: {} - {}", code, reason);
                    break Ok(());
                }
                Frame::Control => continue,
            };

            let message = InboundMessage::decode(text);
            if self.options.terminate_on_window_close && message.is_shutdown() {
                tracing::info!(event = ?message.event(), "shell is closing, stopping extension");
                break Ok(());
            }

            self.shared.traffic.inbound(&message.to_log_text());
            on_message(message);
        };

        self.shutdown().await;
        result
    }

    async fn shutdown(self) {
        self.shared.set_state(ConnectionState::Closed);
        // Ignored when the writer already stopped.
        let _ = self.shared.outbound.send(Message::Close(None));

        let mut writer = self.writer;
        if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
    }
}

fn redact_connect_token(url: &str) -> String {
    match url.split_once("&connectToken=") {
        Some((base, _)) => format!("{base}&connectToken=***"),
        None => url.to_string(),
    }
}

/// Sender wired to a bare channel in the `Open` state, for handler tests.
#[cfg(test)]
pub(crate) fn open_sender(access_token: &str) -> (MessageSender, mpsc::UnboundedReceiver<Message>) {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        access_token: access_token.to_string(),
        state: RwLock::new(ConnectionState::Open),
        outbound,
        traffic: TrafficLog::new(false, false),
    });
    (MessageSender { shared }, outbound_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> ConnectionParams {
        ConnectionParams {
            port: 1,
            token: "tok".to_string(),
            connect_token: Some("once".to_string()),
            extension_id: "extTest".to_string(),
        }
    }

    fn frame_json(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_send_before_open_is_dropped() {
        let mut host = ExtensionHost::new(params(), HostOptions::default());
        let sender = host.sender();

        assert_eq!(sender.state(), ConnectionState::Created);
        assert!(!sender.send_message("pingResult", json!("early")));
        assert!(host.outbound_rx.try_recv().is_err());
    }

    #[test]
    fn test_send_when_open_produces_one_frame() {
        let mut host = ExtensionHost::new(params(), HostOptions::default());
        host.shared.set_state(ConnectionState::Open);

        assert!(host.sender().send_message("pingResult", json!({"n": 1})));

        let value = frame_json(host.outbound_rx.try_recv().unwrap());
        assert_eq!(value["accessToken"], "tok");
        assert_eq!(value["method"], "app.broadcast");
        assert_eq!(value["data"]["event"], "pingResult");
        assert_eq!(value["data"]["data"], json!({"n": 1}));
        assert!(host.outbound_rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let mut host = ExtensionHost::new(params(), HostOptions::default());
        host.shared.set_state(ConnectionState::Closed);

        assert!(!host.sender().send_message("pingResult", Value::Null));
        assert!(host.outbound_rx.try_recv().is_err());
    }

    #[test]
    fn test_sends_keep_submission_order() {
        let (sender, mut rx) = open_sender("tok");
        for i in 0..4 {
            assert!(sender.send_message("step", json!(i)));
        }
        for i in 0..4 {
            assert_eq!(frame_json(rx.try_recv().unwrap())["data"]["data"], json!(i));
        }
    }

    #[tokio::test]
    async fn test_connect_failure_closes_host() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut p = params();
        p.port = port;
        let host = ExtensionHost::new(p, HostOptions::default());
        let sender = host.sender();

        let err = host.connect().await.unwrap_err();
        match err {
            HostError::Connect { url, .. } => {
                assert!(url.ends_with("&connectToken=***"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sender.state(), ConnectionState::Closed);
        assert!(!sender.send_message("pingResult", Value::Null));
    }

    #[test]
    fn test_redact_connect_token() {
        assert_eq!(
            redact_connect_token("ws://127.0.0.1:1?extensionId=a&connectToken=b"),
            "ws://127.0.0.1:1?extensionId=a&connectToken=***"
        );
        assert_eq!(
            redact_connect_token("ws://127.0.0.1:1?extensionId=a"),
            "ws://127.0.0.1:1?extensionId=a"
        );
    }
}
