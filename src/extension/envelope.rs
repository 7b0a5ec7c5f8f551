//! Wire format shared by the extension and the shell's broker.
//!
//! Outbound traffic is always an [`Envelope`]. Inbound traffic is whatever the
//! broker relays, conventionally `{event, data}`, and is handled best-effort
//! through [`InboundMessage`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Broker method used to push an event to every listener in the app.
pub const BROADCAST_METHOD: &str = "app.broadcast";

/// Well-known event names.
pub mod events {
    /// Frontend asks the extension to run one of its functions
    pub const RUN_FUNCTION: &str = "runBun";
    /// Result or progress pushed from the extension to the frontend
    pub const PING_RESULT: &str = "pingResult";
    /// The shell's window is closing
    pub const WINDOW_CLOSE: &str = "windowClose";
    /// The shell application is closing
    pub const APP_CLOSE: &str = "appClose";
}

/// Outbound wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Fresh random identifier per message
    pub id: Uuid,
    /// Broker method this envelope invokes
    pub method: String,
    /// Access token issued by the shell at startup
    pub access_token: String,
    /// Method-specific payload
    pub data: Value,
}

impl Envelope {
    /// Build an envelope calling an arbitrary broker method.
    pub fn new(method: impl Into<String>, access_token: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            access_token: access_token.into(),
            data,
        }
    }

    /// Build an `app.broadcast` envelope carrying `{event, data}`.
    pub fn broadcast(access_token: impl Into<String>, event: &str, data: Value) -> Self {
        Self::new(
            BROADCAST_METHOD,
            access_token,
            json!({
                "event": event,
                "data": data,
            }),
        )
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Frame parsed as JSON
    Json(Value),
    /// Frame that was not valid JSON, kept verbatim
    Raw(String),
}

impl InboundMessage {
    /// Decode frame text, falling back to the raw string when it is not JSON.
    pub fn decode(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => InboundMessage::Json(value),
            Err(_) => InboundMessage::Raw(text),
        }
    }

    /// The `event` field, if the message has one.
    pub fn event(&self) -> Option<&str> {
        match self {
            InboundMessage::Json(value) => value.get("event").and_then(Value::as_str),
            InboundMessage::Raw(_) => None,
        }
    }

    /// The `data` field, if the message has one.
    pub fn data(&self) -> Option<&Value> {
        match self {
            InboundMessage::Json(value) => value.get("data"),
            InboundMessage::Raw(_) => None,
        }
    }

    /// Check the message for a particular event.
    pub fn is_event(&self, name: &str) -> bool {
        self.event() == Some(name)
    }

    /// True for the shell's window/app close notifications.
    pub fn is_shutdown(&self) -> bool {
        self.is_event(events::WINDOW_CLOSE) || self.is_event(events::APP_CLOSE)
    }

    /// Extract a function dispatch request from a `runBun` message.
    pub fn function_call(&self) -> Option<FunctionCall> {
        if !self.is_event(events::RUN_FUNCTION) {
            return None;
        }
        serde_json::from_value(self.data()?.clone()).ok()
    }

    /// Render the message as log text.
    pub fn to_log_text(&self) -> String {
        match self {
            InboundMessage::Json(value) => value.to_string(),
            InboundMessage::Raw(text) => text.clone(),
        }
    }
}

/// Payload of a `runBun` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the extension function to run
    pub function: String,
    /// Single argument handed to the function
    #[serde(default)]
    pub parameter: Value,
}

impl FunctionCall {
    /// Create a call to `function` with `parameter`.
    pub fn new(function: impl Into<String>, parameter: Value) -> Self {
        Self {
            function: function.into(),
            parameter,
        }
    }
}
