//! WebSocket plumbing shared by the extension host and the broker client.
//!
//! A connection is split into a read half, consumed by the caller's loop, and
//! a write half owned by a single writer task. Everything that wants to send
//! goes through the writer's channel, so frames leave in submission order.

use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Client WebSocket stream to the broker.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half of a broker connection.
pub type WsReader = SplitStream<WsStream>;

/// Write half of a broker connection.
pub type WsWriter = SplitSink<WsStream, Message>;

/// Open a client connection to `url` and split it.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader), tungstenite::Error> {
    let (stream, _response) = connect_async(url).await?;
    Ok(stream.split())
}

/// Spawn the single writer for a connection.
///
/// The task ends after forwarding a close frame, when the sink fails, or
/// when every sender is dropped.
pub fn spawn_writer<S>(sink: S, outbound: mpsc::UnboundedReceiver<Message>) -> JoinHandle<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
{
    tokio::spawn(write_loop(sink, outbound))
}

async fn write_loop<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<Message>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            if !closing {
                tracing::error!(error = %err, "WebSocket send failed");
            }
            break;
        }
        if closing {
            break;
        }
    }
}

/// What the read loop should do with one frame.
#[derive(Debug)]
pub enum Frame {
    /// Payload text (binary frames are decoded as UTF-8)
    Text(String),
    /// Peer is closing, with optional code and reason
    Close(Option<(u16, String)>),
    /// Control frame handled by the transport
    Control,
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.to_string()),
            Message::Binary(bytes) => Frame::Text(String::from_utf8_lossy(&bytes).into_owned()),
            Message::Close(frame) => {
                Frame::Close(frame.map(|f| (u16::from(f.code), f.reason.to_string())))
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Control,
        }
    }
}
