//! Example extension functions
//!
//! [`AppFunctions::process_app_event`] is the dispatch callback handed to the
//! host's receive loop. It only reacts to `runBun` requests and silently
//! ignores everything else.

use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::envelope::{InboundMessage, events};
use super::host::MessageSender;

/// Function names understood by [`AppFunctions`].
pub mod names {
    /// Reply immediately with one result event
    pub const PING: &str = "ping";
    /// Push a series of progress events over time
    pub const LONG_RUN: &str = "longRun";
}

/// Last counter value reported by the long-running function.
pub const LONG_RUN_STEPS: u32 = 5;

/// Shortest spacing allowed between long-running progress events.
pub const MIN_LONG_RUN_INTERVAL: Duration = Duration::from_millis(1);

/// Local functions callable from the frontend.
#[derive(Debug, Clone)]
pub struct AppFunctions {
    sender: MessageSender,
    long_run_interval: Duration,
}

impl AppFunctions {
    /// Create the function table, pushing results through `sender`.
    ///
    /// A zero `long_run_interval` is raised to [`MIN_LONG_RUN_INTERVAL`].
    pub fn new(sender: MessageSender, long_run_interval: Duration) -> Self {
        let long_run_interval = if long_run_interval.is_zero() {
            tracing::warn!("long-running interval is zero, using {:?}", MIN_LONG_RUN_INTERVAL);
            MIN_LONG_RUN_INTERVAL
        } else {
            long_run_interval
        };

        Self {
            sender,
            long_run_interval,
        }
    }

    /// Handle one inbound app event.
    pub fn process_app_event(&self, message: InboundMessage) {
        let Some(call) = message.function_call() else {
            if message.is_event(events::RUN_FUNCTION) {
                tracing::debug!("ignoring malformed function call");
            }
            return;
        };

        match call.function.as_str() {
            names::PING => self.ping(&call.parameter),
            names::LONG_RUN => {
                self.long_run();
            }
            other => tracing::trace!(function = other, "ignoring unknown function"),
        }
    }

    /// Send a single `pingResult` echoing `parameter`.
    pub fn ping(&self, parameter: &Value) {
        let reply = format!(
            "Rust says PONG, in reply to \"{}\"",
            parameter_text(parameter)
        );
        self.sender
            .send_message(events::PING_RESULT, Value::String(reply));
    }

    /// Start the long-running task.
    ///
    /// Sends `LONG_RUN_STEPS + 1` progress events, the first immediately and
    /// the rest one interval apart. The task cannot be cancelled and does not
    /// announce completion.
    pub fn long_run(&self) -> JoinHandle<()> {
        let sender = self.sender.clone();
        let period = self.long_run_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for step in 0..=LONG_RUN_STEPS {
                ticker.tick().await;
                let progress = format!("Long-running task progress: {step}/{LONG_RUN_STEPS}");
                sender.send_message(events::PING_RESULT, Value::String(progress));
            }
        })
    }
}

fn parameter_text(parameter: &Value) -> String {
    match parameter {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::host::open_sender;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;
    use tokio_tungstenite::tungstenite::Message;

    fn broadcast_data(message: Message) -> Value {
        let Message::Text(text) = message else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["event"], "pingResult");
        value["data"]["data"].clone()
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn dispatch(functions: &AppFunctions, raw: Value) {
        functions.process_app_event(InboundMessage::Json(raw));
    }

    #[tokio::test]
    async fn test_ping_sends_one_result() {
        let (sender, mut rx) = open_sender("tok");
        let functions = AppFunctions::new(sender, Duration::from_secs(1));

        dispatch(
            &functions,
            json!({"event": "runBun", "data": {"function": "ping", "parameter": "x"}}),
        );

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let data = broadcast_data(frames.into_iter().next().unwrap());
        assert!(data.as_str().unwrap().contains("\"x\""));
    }

    #[tokio::test]
    async fn test_ping_renders_structured_parameter() {
        let (sender, mut rx) = open_sender("tok");
        let functions = AppFunctions::new(sender, Duration::from_secs(1));

        functions.ping(&json!({"a": 1}));

        let data = broadcast_data(rx.try_recv().unwrap());
        assert_eq!(data, json!("Rust says PONG, in reply to \"{\"a\":1}\""));
    }

    #[tokio::test]
    async fn test_unknown_events_and_functions_are_ignored() {
        let (sender, mut rx) = open_sender("tok");
        let functions = AppFunctions::new(sender, Duration::from_secs(1));

        dispatch(&functions, json!({"event": "ready", "data": null}));
        dispatch(
            &functions,
            json!({"event": "runBun", "data": {"function": "nope"}}),
        );
        dispatch(&functions, json!({"event": "runBun", "data": "garbage"}));
        functions.process_app_event(InboundMessage::Raw("plain text".to_string()));

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_run_sends_six_spaced_events() {
        let (sender, mut rx) = open_sender("tok");
        let interval = Duration::from_millis(750);
        let functions = AppFunctions::new(sender, interval);

        let start = Instant::now();
        dispatch(
            &functions,
            json!({"event": "runBun", "data": {"function": "longRun"}}),
        );

        let mut arrivals = Vec::new();
        for _ in 0..=LONG_RUN_STEPS {
            let frame = rx.recv().await.unwrap();
            arrivals.push((Instant::now() - start, broadcast_data(frame)));
        }

        for (i, (elapsed, data)) in arrivals.iter().enumerate() {
            assert_eq!(*elapsed, interval * i as u32);
            assert!(data.as_str().unwrap().contains(&format!("{i}/5")));
        }

        tokio::time::sleep(interval * 4).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let (sender, mut rx) = open_sender("tok");
        let functions = AppFunctions::new(sender, Duration::ZERO);
        assert_eq!(functions.long_run_interval, MIN_LONG_RUN_INTERVAL);

        let start = Instant::now();
        functions.long_run().await.unwrap();

        assert_eq!(Instant::now() - start, MIN_LONG_RUN_INTERVAL * LONG_RUN_STEPS);
        assert_eq!(drain(&mut rx).len(), LONG_RUN_STEPS as usize + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_run_does_not_block_other_calls() {
        let (sender, mut rx) = open_sender("tok");
        let functions = AppFunctions::new(sender, Duration::from_secs(1));

        let task = functions.long_run();
        let first = broadcast_data(rx.recv().await.unwrap());

        // The task is now parked on its next tick.
        functions.ping(&json!("mid"));
        let second = broadcast_data(rx.recv().await.unwrap());
        assert!(first.as_str().unwrap().contains("0/5"));
        assert!(second.as_str().unwrap().contains("\"mid\""));

        task.await.unwrap();
        assert_eq!(drain(&mut rx).len(), LONG_RUN_STEPS as usize);
    }
}
