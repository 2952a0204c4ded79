//! Inbound message dispatcher
//!
//! Decodes every inbound frame, answers heartbeat traffic, reports control
//! commands, and hands everything else to the application's
//! [`MessageHandler`]. Nothing that goes wrong here propagates past the
//! dispatcher or closes the connection.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::connection::Connection;
use crate::error::AppError;
use crate::events::{EventLevel, EventSink};
use crate::message::{ControlCommand, Envelope, Payload};
use crate::registry::Registry;
use crate::sender::Outbound;
use crate::types::{ConnectionId, LivenessStatus};

/// Application hooks
///
/// Called on the hub task, so implementations should hand long work off to
/// their own tasks. A panic inside a hook is caught and reported.
pub trait MessageHandler: Send + Sync {
    /// Every envelope whose command is not a control command
    fn on_message(&self, envelope: Envelope, connection: &Connection);

    /// After the connection has been removed from the registry
    fn on_close(&self, _connection: &Connection) {}
}

/// Handler that drops application messages
#[derive(Debug, Default)]
pub struct NoopHandler;

impl MessageHandler for NoopHandler {
    fn on_message(&self, _envelope: Envelope, _connection: &Connection) {}
}

pub struct Dispatcher {
    outbound: Outbound,
    events: EventSink,
    handler: Arc<dyn MessageHandler>,
}

impl Dispatcher {
    pub fn new(outbound: Outbound, events: EventSink, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            outbound,
            events,
            handler,
        }
    }

    /// Handle one inbound frame from connection `id`
    pub fn on_message(&self, registry: &mut Registry, id: ConnectionId, raw: &str) {
        let envelope = match self.outbound.codec().decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.report_malformed(raw, &e);
                return;
            }
        };

        if !envelope.payload.is_heartbeat() {
            self.events
                .emit(EventLevel::All, "Received", serde_json::to_value(&envelope).ok());
        }

        let Some(connection) = registry.connection(id).cloned() else {
            self.events
                .error(AppError::UnknownConnection(id).to_string(), None);
            return;
        };

        match envelope.payload.control_command() {
            Some(ControlCommand::Disconnect) => {
                let who = envelope
                    .payload
                    .data
                    .as_ref()
                    .and_then(|data| data.get("ID"))
                    .map(display_value)
                    .unwrap_or_else(|| connection.id.to_string());
                self.events.debug(format!("{} Connection closed", who));
            }
            Some(ControlCommand::Pong) => {
                registry.set_status(id, LivenessStatus::Alive);
            }
            Some(ControlCommand::Ping) => {
                registry.set_status(id, LivenessStatus::Alive);
                let _ = self
                    .outbound
                    .send_to(&connection, &Payload::control(ControlCommand::Pong));
            }
            Some(ControlCommand::Error) => {
                self.events.error(
                    format!("Device {} has entered an error state", envelope.header.from_id),
                    None,
                );
                self.events.error(
                    format!(
                        "Message: {}",
                        envelope.payload.error.as_deref().unwrap_or("<none>")
                    ),
                    None,
                );
            }
            None => {
                let handler = &self.handler;
                let result = catch_unwind(AssertUnwindSafe(|| {
                    handler.on_message(envelope, &connection)
                }));
                if let Err(panic) = result {
                    self.events.error(
                        format!("Message handler failed for {}", connection.id),
                        Some(json!({ "panic": panic_message(panic.as_ref()) })),
                    );
                }
            }
        }
    }

    /// Handle the transport's close signal for connection `id`
    ///
    /// The registry entry is always removed before the close hook runs.
    pub fn on_close(&self, registry: &mut Registry, id: ConnectionId) {
        self.events.debug("Connection closed");

        let Some(connection) = registry.unregister(id) else {
            self.events
                .debug(AppError::UnknownConnection(id).to_string());
            return;
        };

        let handler = &self.handler;
        let result = catch_unwind(AssertUnwindSafe(|| handler.on_close(&connection)));
        if let Err(panic) = result {
            self.events.error(
                "Could not end connection cleanly",
                Some(json!({ "panic": panic_message(panic.as_ref()) })),
            );
        }
    }

    /// Classify a frame the codec rejected
    fn report_malformed(&self, raw: &str, err: &AppError) {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(parse_err) => {
                self.events.error(
                    "Invalid JSON",
                    Some(json!({ "error": parse_err.to_string() })),
                );
                self.events
                    .emit(EventLevel::All, format!("Received: {}", raw), None);
                return;
            }
        };

        let command = value
            .get("payload")
            .and_then(|p| p.get("command"))
            .and_then(Value::as_str);
        if !matches!(command, Some("ping" | "pong")) {
            self.events
                .emit(EventLevel::All, "Received", Some(value.clone()));
        }

        if value.get("type").is_none() {
            self.events
                .error("Server error", Some(json!({ "error": err.to_string() })));
        } else {
            let violation = AppError::ProtocolViolation(err.to_string());
            self.events.error(
                "A device is using an invalid JSON format",
                Some(json!({ "error": violation.to_string() })),
            );
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
