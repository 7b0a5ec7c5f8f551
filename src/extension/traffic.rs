//! Debug traffic log.
//!
//! Mirrors every frame crossing the socket as `IN:`/`OUT:` lines when debug
//! mode is on. Inbound function calls get their own colour so they stand out
//! from ordinary shell events.

use super::envelope::events;

const COLOR_IN: &str = "\x1b[32m";
const COLOR_CALL: &str = "\x1b[91m";
const COLOR_OUT: &str = "\x1b[33m";
const COLOR_RESET: &str = "\x1b[0m";

/// Frame direction relative to the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the broker
    In,
    /// Sent to the broker
    Out,
}

/// Formats and emits traffic lines.
#[derive(Debug, Clone, Copy)]
pub struct TrafficLog {
    debug: bool,
    colors: bool,
}

impl TrafficLog {
    /// Create a traffic log; nothing is emitted unless `debug` is set.
    pub fn new(debug: bool, colors: bool) -> Self {
        Self { debug, colors }
    }

    /// Log a received frame.
    pub fn inbound(&self, text: &str) {
        if let Some(line) = self.render(Direction::In, text) {
            tracing::info!(direction = "in", "{line}");
        }
    }

    /// Log a sent frame.
    pub fn outbound(&self, text: &str) {
        if let Some(line) = self.render(Direction::Out, text) {
            tracing::info!(direction = "out", "{line}");
        }
    }

    /// Build the log line for a frame, or `None` when debug mode is off.
    pub fn render(&self, direction: Direction, text: &str) -> Option<String> {
        if !self.debug {
            return None;
        }

        let (label, color) = match direction {
            Direction::In if text.contains(events::RUN_FUNCTION) => ("IN: ", COLOR_CALL),
            Direction::In => ("IN: ", COLOR_IN),
            Direction::Out => ("OUT:", COLOR_OUT),
        };

        if self.colors {
            Some(format!("{color}{label} {text}{COLOR_RESET}"))
        } else {
            Some(format!("{label} {text}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_without_debug() {
        let log = TrafficLog::new(false, true);
        assert_eq!(log.render(Direction::In, "{}"), None);
        assert_eq!(log.render(Direction::Out, "{}"), None);
    }

    #[test]
    fn test_plain_lines() {
        let log = TrafficLog::new(true, false);
        assert_eq!(log.render(Direction::In, "x").unwrap(), "IN:  x");
        assert_eq!(log.render(Direction::Out, "y").unwrap(), "OUT: y");
    }

    #[test]
    fn test_function_calls_are_highlighted() {
        let log = TrafficLog::new(true, true);
        let call = log
            .render(Direction::In, r#"{"event":"runBun"}"#)
            .unwrap();
        let plain = log
            .render(Direction::In, r#"{"event":"ready"}"#)
            .unwrap();

        assert!(call.starts_with(COLOR_CALL));
        assert!(plain.starts_with(COLOR_IN));
        assert!(call.ends_with(COLOR_RESET));
    }
}
