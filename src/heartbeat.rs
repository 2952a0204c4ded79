//! Heartbeat monitor
//!
//! Each tick walks the registry and advances liveness:
//! `Alive` → probe sent, `PendingProbe`; `PendingProbe` → `Dead`;
//! `Dead` stays `Dead`. Death is advisory only: the monitor never closes a
//! connection.

use std::time::Duration;

use serde_json::json;

use crate::events::{EventLevel, EventSink};
use crate::message::{ControlCommand, Payload};
use crate::registry::Registry;
use crate::sender::Outbound;
use crate::types::LivenessStatus;

/// Default probe period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Tallies from one tick
///
/// `alive` counts connections probed this tick; `dead` counts connections
/// that were already `Dead` when the tick started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub alive: usize,
    pub dead: usize,
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    outbound: Outbound,
    events: EventSink,
}

impl HeartbeatMonitor {
    pub fn new(outbound: Outbound, events: EventSink) -> Self {
        Self { outbound, events }
    }

    /// Run one heartbeat cycle
    ///
    /// Connections whose transport is no longer open are skipped. Send
    /// failures are reported by the sender and do not stop the walk.
    pub fn tick(&self, registry: &mut Registry) -> TickReport {
        self.events.emit(EventLevel::Ping, "Doing client pings", None);

        let ping = Payload::control(ControlCommand::Ping);
        let mut report = TickReport::default();

        registry.for_each(|connection, state| {
            if !connection.is_open() {
                return;
            }
            match state.status {
                LivenessStatus::Alive => {
                    report.alive += 1;
                    let _ = self.outbound.send_to(connection, &ping);
                    state.status = LivenessStatus::PendingProbe;
                }
                LivenessStatus::PendingProbe => {
                    state.status = LivenessStatus::Dead;
                }
                LivenessStatus::Dead => {
                    report.dead += 1;
                }
            }
        });

        self.events.emit(
            EventLevel::Ping,
            format!("Dead: {}, Alive: {}", report.dead, report.alive),
            Some(json!({ "dead": report.dead, "alive": report.alive })),
        );
        report
    }
}
