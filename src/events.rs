//! Observability channel
//!
//! The core reports everything through leveled [`ServerEvent`]s. Each event
//! is broadcast to subscribers and mirrored into `tracing`; nothing here
//! writes to a console or file directly.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, trace};

/// Buffered events per subscriber before the slowest one starts lagging
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Event level, with the single-letter codes used by log consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    /// `D`
    Debug,
    /// `A`: full traffic trace
    All,
    /// `E`
    Error,
    /// `P`: heartbeat activity
    Ping,
}

impl EventLevel {
    pub fn code(&self) -> char {
        match self {
            EventLevel::Debug => 'D',
            EventLevel::All => 'A',
            EventLevel::Error => 'E',
            EventLevel::Ping => 'P',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub level: EventLevel,
    pub message: String,
    pub detail: Option<Value>,
}

/// Emitter shared by every core component
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, level: EventLevel, message: impl Into<String>, detail: Option<Value>) {
        let event = ServerEvent {
            level,
            message: message.into(),
            detail,
        };

        let detail = event.detail.as_ref().map(Value::to_string).unwrap_or_default();
        match level {
            EventLevel::Debug => debug!(detail = %detail, "{}", event.message),
            EventLevel::All => trace!(detail = %detail, "{}", event.message),
            EventLevel::Error => error!(detail = %detail, "{}", event.message),
            EventLevel::Ping => {
                debug!(target: "envelope_server::heartbeat", detail = %detail, "{}", event.message)
            }
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(EventLevel::Debug, message, None);
    }

    pub fn error(&self, message: impl Into<String>, detail: Option<Value>) {
        self.emit(EventLevel::Error, message, detail);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_without_subscribers() {
        let sink = EventSink::new();
        sink.debug("nobody listening");
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();

        sink.emit(EventLevel::Ping, "Dead: 0, Alive: 1", Some(json!({"alive": 1})));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.level, EventLevel::Ping);
        assert_eq!(event.message, "Dead: 0, Alive: 1");
        assert_eq!(event.detail, Some(json!({"alive": 1})));
    }

    #[test]
    fn test_level_codes() {
        assert_eq!(EventLevel::Debug.code(), 'D');
        assert_eq!(EventLevel::All.code(), 'A');
        assert_eq!(EventLevel::Error.code(), 'E');
        assert_eq!(EventLevel::Ping.code(), 'P');
    }
}
