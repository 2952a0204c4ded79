//! Broadcast/unicast sender
//!
//! Encodes payloads through the codec and writes them to one, all, or a
//! filtered subset of registered connections. No retries; a failed write is
//! reported and never unregisters the connection.

use serde_json::json;

use crate::codec::Codec;
use crate::connection::Connection;
use crate::error::AppError;
use crate::events::EventSink;
use crate::message::Payload;
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct Outbound {
    codec: Codec,
    events: EventSink,
}

impl Outbound {
    pub fn new(codec: Codec, events: EventSink) -> Self {
        Self { codec, events }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Encode and queue `payload` for one connection
    ///
    /// Failures are reported on the event channel before being returned.
    pub fn send_to(&self, connection: &Connection, payload: &Payload) -> Result<(), AppError> {
        let result = self.codec.encode(payload).and_then(|frame| {
            connection
                .send(frame)
                .map_err(|source| AppError::TransportWriteFailure {
                    id: connection.id,
                    source,
                })
        });

        if let Err(e) = &result {
            self.events.error(
                format!("Could not send to {}", connection.id),
                Some(json!({ "command": payload.command, "reason": e.to_string() })),
            );
        }
        result
    }

    /// Send to every registered connection, open or not
    ///
    /// Returns how many writes succeeded.
    pub fn send_to_all(&self, registry: &mut Registry, payload: &Payload) -> usize {
        self.send_to_filtered(registry, |_| true, payload)
    }

    /// Send to the registered connections matching `predicate`
    pub fn send_to_filtered<P>(&self, registry: &mut Registry, predicate: P, payload: &Payload) -> usize
    where
        P: FnMut(&Connection) -> bool,
    {
        let mut delivered = 0;
        registry.for_each_filtered(predicate, |connection, _| {
            if self.send_to(connection, payload).is_ok() {
                delivered += 1;
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ServerIdentity;
    use crate::events::EventLevel;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn outbound() -> Outbound {
        Outbound::new(
            Codec::new(ServerIdentity::new("2.0.0", "Broadcaster")),
            EventSink::new(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn test_send_to_all_reaches_every_connection() {
        let outbound = outbound();
        let mut registry = Registry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (conn, rx) = Connection::channel("peer");
            registry.register(conn);
            receivers.push(rx);
        }

        let delivered = outbound.send_to_all(&mut registry, &Payload::new("x"));
        assert_eq!(delivered, 3);

        for rx in receivers.iter_mut() {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["payload"], json!({"command": "x"}));
            assert_eq!(frames[0]["header"]["system"], "Broadcaster");
            assert_eq!(frames[0]["header"]["version"], "2.0.0");
        }
    }

    #[test]
    fn test_send_to_filtered_only_matching() {
        let outbound = outbound();
        let mut registry = Registry::new();
        let (a, mut rx_a) = Connection::channel("a");
        let (b, mut rx_b) = Connection::channel("b");
        let target = a.clone();
        registry.register(a);
        registry.register(b);

        let delivered =
            outbound.send_to_filtered(&mut registry, |c| *c == target, &Payload::new("hello"));

        assert_eq!(delivered, 1);
        let frames = drain(&mut rx_a);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["payload"]["command"], "hello");
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_failed_write_is_reported_and_kept_registered() {
        let outbound = outbound();
        let mut events = outbound.events.subscribe();
        let mut registry = Registry::new();
        let (closed, rx_closed) = Connection::channel("closed");
        let (open, mut rx_open) = Connection::channel("open");
        let closed_id = closed.id;
        registry.register(closed);
        registry.register(open);
        drop(rx_closed);

        let delivered = outbound.send_to_all(&mut registry, &Payload::new("x"));

        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx_open).len(), 1);
        assert!(registry.get(closed_id).is_some());

        let event = events.try_recv().unwrap();
        assert_eq!(event.level, EventLevel::Error);
    }

    #[test]
    fn test_send_to_returns_write_failure() {
        let outbound = outbound();
        let (conn, rx) = Connection::channel("peer");
        drop(rx);

        let err = outbound.send_to(&conn, &Payload::new("x")).unwrap_err();
        assert!(matches!(err, AppError::TransportWriteFailure { .. }));
    }
}
