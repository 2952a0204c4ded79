//! Hub actor implementation
//!
//! The central actor that owns the connection registry. Transport handlers
//! and the application talk to it through [`HubHandle`]; the heartbeat
//! timer runs inside the same loop, so every registry access is serialized
//! without locks.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::codec::{Codec, ServerIdentity};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::dispatcher::{Dispatcher, MessageHandler};
use crate::error::AppError;
use crate::events::{EventSink, ServerEvent};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::Payload;
use crate::registry::Registry;
use crate::sender::Outbound;
use crate::types::{ConnectionId, LivenessStatus};

/// Recipient predicate for filtered sends
pub type ConnectionFilter = Box<dyn Fn(&Connection) -> bool + Send>;

/// Commands sent to the Hub actor
pub enum HubCommand {
    /// Transport accepted a connection
    Connect { connection: Connection },
    /// Text frame received on a connection
    Inbound { id: ConnectionId, raw: String },
    /// Transport signalled closure
    Closed { id: ConnectionId },
    /// Send to one registered connection
    SendTo { id: ConnectionId, payload: Payload },
    /// Send to every registered connection
    SendToAll { payload: Payload },
    /// Send to registered connections matching a predicate
    SendToFiltered {
        filter: ConnectionFilter,
        payload: Payload,
    },
    /// Query a connection's liveness
    Status {
        id: ConnectionId,
        reply: oneshot::Sender<Option<LivenessStatus>>,
    },
    /// Query the number of registered connections
    Count { reply: oneshot::Sender<usize> },
    /// Stop the hub and its heartbeat
    Shutdown,
}

impl fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubCommand::Connect { connection } => f
                .debug_struct("Connect")
                .field("id", &connection.id)
                .finish(),
            HubCommand::Inbound { id, raw } => f
                .debug_struct("Inbound")
                .field("id", id)
                .field("raw", raw)
                .finish(),
            HubCommand::Closed { id } => f.debug_struct("Closed").field("id", id).finish(),
            HubCommand::SendTo { id, payload } => f
                .debug_struct("SendTo")
                .field("id", id)
                .field("payload", payload)
                .finish(),
            HubCommand::SendToAll { payload } => f
                .debug_struct("SendToAll")
                .field("payload", payload)
                .finish(),
            HubCommand::SendToFiltered { payload, .. } => f
                .debug_struct("SendToFiltered")
                .field("payload", payload)
                .finish_non_exhaustive(),
            HubCommand::Status { id, .. } => f.debug_struct("Status").field("id", id).finish(),
            HubCommand::Count { .. } => f.write_str("Count"),
            HubCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Commands buffered for the hub before senders feel backpressure
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Cloneable entry point to a running [`Hub`]
///
/// Transport events and queries wait for room in the hub's queue, which
/// throttles a flooding client's read task. Application sends never wait,
/// so hooks running on the hub task can call them; a full queue is
/// reported as [`AppError::HubBusy`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    events: EventSink,
}

impl HubHandle {
    async fn command(&self, cmd: HubCommand) -> Result<(), AppError> {
        self.tx.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    fn try_command(&self, cmd: HubCommand) -> Result<(), AppError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => AppError::HubBusy,
            TrySendError::Closed(_) => AppError::ChannelSend,
        })
    }

    pub async fn connect(&self, connection: Connection) -> Result<(), AppError> {
        self.command(HubCommand::Connect { connection }).await
    }

    pub async fn inbound(&self, id: ConnectionId, raw: String) -> Result<(), AppError> {
        self.command(HubCommand::Inbound { id, raw }).await
    }

    pub async fn closed(&self, id: ConnectionId) -> Result<(), AppError> {
        self.command(HubCommand::Closed { id }).await
    }

    pub fn send_to(&self, id: ConnectionId, payload: Payload) -> Result<(), AppError> {
        self.try_command(HubCommand::SendTo { id, payload })
    }

    pub fn send_to_all(&self, payload: Payload) -> Result<(), AppError> {
        self.try_command(HubCommand::SendToAll { payload })
    }

    pub fn send_to_filtered<F>(&self, filter: F, payload: Payload) -> Result<(), AppError>
    where
        F: Fn(&Connection) -> bool + Send + 'static,
    {
        self.try_command(HubCommand::SendToFiltered {
            filter: Box::new(filter),
            payload,
        })
    }

    pub async fn status(&self, id: ConnectionId) -> Result<Option<LivenessStatus>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::Status { id, reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    pub async fn connection_count(&self) -> Result<usize, AppError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::Count { reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Receive every server event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// The hub's event channel, for transport code reporting on its behalf
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.command(HubCommand::Shutdown).await
    }
}

/// The Hub actor
///
/// Owns the registry and runs the dispatcher, sender and heartbeat against
/// it from a single task.
pub struct Hub {
    registry: Registry,
    dispatcher: Dispatcher,
    heartbeat: HeartbeatMonitor,
    outbound: Outbound,
    events: EventSink,
    heartbeat_interval: Duration,
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Create a hub and the handle used to drive it
    pub fn new(config: &ServerConfig, handler: Arc<dyn MessageHandler>) -> (Self, HubHandle) {
        let (tx, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let events = EventSink::new();
        let codec = Codec::new(ServerIdentity::new(
            config.version.clone(),
            config.system.clone(),
        ));
        let outbound = Outbound::new(codec, events.clone());

        let hub = Self {
            registry: Registry::new(),
            dispatcher: Dispatcher::new(outbound.clone(), events.clone(), handler),
            heartbeat: HeartbeatMonitor::new(outbound.clone(), events.clone()),
            outbound,
            events: events.clone(),
            heartbeat_interval: config.heartbeat_interval,
            receiver,
        };
        (hub, HubHandle { tx, events })
    }

    pub fn identity(&self) -> &ServerIdentity {
        self.outbound.codec().identity()
    }

    /// Run the Hub event loop
    ///
    /// Processes commands and heartbeat ticks until `Shutdown` arrives or
    /// every handle is dropped.
    pub async fn run(mut self) {
        info!(server_id = %self.identity().id, "Hub started");

        let period = self.heartbeat_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                _ = ticker.tick() => {
                    self.heartbeat.tick(&mut self.registry);
                }
            }
        }

        info!("Hub shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { connection } => {
                self.events.debug("New client connected");
                self.registry.register(connection);
                debug!("Total connections: {}", self.registry.len());
            }
            HubCommand::Inbound { id, raw } => {
                self.dispatcher.on_message(&mut self.registry, id, &raw);
            }
            HubCommand::Closed { id } => {
                self.dispatcher.on_close(&mut self.registry, id);
                debug!("Total connections: {}", self.registry.len());
            }
            HubCommand::SendTo { id, payload } => match self.registry.connection(id) {
                Some(connection) => {
                    let _ = self.outbound.send_to(connection, &payload);
                }
                None => {
                    self.events
                        .error(AppError::UnknownConnection(id).to_string(), None);
                }
            },
            HubCommand::SendToAll { payload } => {
                self.outbound.send_to_all(&mut self.registry, &payload);
            }
            HubCommand::SendToFiltered { filter, payload } => {
                let outbound = &self.outbound;
                let registry = &mut self.registry;
                let result = catch_unwind(AssertUnwindSafe(|| {
                    outbound.send_to_filtered(registry, |c| filter(c), &payload)
                }));
                if result.is_err() {
                    self.events.error("Send filter failed", None);
                }
            }
            HubCommand::Status { id, reply } => {
                let _ = reply.send(self.registry.get(id).map(|state| state.status));
            }
            HubCommand::Count { reply } => {
                let _ = reply.send(self.registry.len());
            }
            // Handled by the run loop
            HubCommand::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::NoopHandler;
    use crate::message::Envelope;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::task::JoinHandle;

    fn start(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Hub::new(&config, handler);
        (handle, tokio::spawn(hub.run()))
    }

    async fn next_frame(rx: &mut mpsc::Receiver<String>) -> Value {
        let frame = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("channel closed");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_ping_through_hub() {
        let (handle, task) = start(ServerConfig::default(), Arc::new(NoopHandler));
        let (conn, mut rx) = Connection::channel("peer");
        let id = conn.id;

        handle.connect(conn).await.unwrap();
        handle
            .inbound(id, r#"{"payload":{"command":"ping"}}"#.to_string())
            .await
            .unwrap();

        let reply = next_frame(&mut rx).await;
        assert_eq!(reply["payload"]["command"], "pong");
        assert_eq!(reply["header"]["system"], "WebServer");
        assert_eq!(handle.status(id).await.unwrap(), Some(LivenessStatus::Alive));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_removes_connection() {
        let (handle, _task) = start(ServerConfig::default(), Arc::new(NoopHandler));
        let (conn, _rx) = Connection::channel("peer");
        let id = conn.id;

        handle.connect(conn).await.unwrap();
        assert_eq!(handle.connection_count().await.unwrap(), 1);

        handle.closed(id).await.unwrap();
        assert_eq!(handle.connection_count().await.unwrap(), 0);
        assert_eq!(handle.status(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_filtered_send_through_hub() {
        let (handle, _task) = start(ServerConfig::default(), Arc::new(NoopHandler));
        let (a, mut rx_a) = Connection::channel("a");
        let (b, mut rx_b) = Connection::channel("b");
        let a_id = a.id;
        handle.connect(a).await.unwrap();
        handle.connect(b).await.unwrap();

        handle
            .send_to_filtered(move |c| c.id == a_id, Payload::new("hello"))
            .unwrap();

        let frame = next_frame(&mut rx_a).await;
        assert_eq!(frame["payload"]["command"], "hello");

        // Round-trip a query so the send has certainly been processed
        handle.connection_count().await.unwrap();
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_probes_through_hub() {
        let config = ServerConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let (handle, _task) = start(config, Arc::new(NoopHandler));
        let (conn, mut rx) = Connection::channel("peer");
        let id = conn.id;
        handle.connect(conn).await.unwrap();

        let probe = next_frame(&mut rx).await;
        assert_eq!(probe["payload"]["command"], "ping");

        // No reply: after another tick the connection is dead but still tracked
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.status(id).await.unwrap(), Some(LivenessStatus::Dead));
        assert_eq!(handle.connection_count().await.unwrap(), 1);
    }

    struct Echo {
        hub: Mutex<Option<HubHandle>>,
    }

    impl MessageHandler for Echo {
        fn on_message(&self, envelope: Envelope, connection: &Connection) {
            if let Some(hub) = self.hub.lock().unwrap().as_ref() {
                let _ = hub.send_to(connection.id, envelope.payload);
            }
        }
    }

    #[tokio::test]
    async fn test_handler_can_reply_through_handle() {
        let echo = Arc::new(Echo {
            hub: Mutex::new(None),
        });
        let (handle, _task) = start(ServerConfig::default(), echo.clone());
        *echo.hub.lock().unwrap() = Some(handle.clone());

        let (conn, mut rx) = Connection::channel("peer");
        let id = conn.id;
        handle.connect(conn).await.unwrap();
        handle
            .inbound(id, r#"{"payload":{"command":"say","data":"hi"}}"#.to_string())
            .await
            .unwrap();

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["payload"]["command"], "say");
        assert_eq!(frame["payload"]["data"], "hi");
        assert_eq!(frame["payload"]["source"], "default");
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        // Hub never runs, so nothing drains the queue
        let (_hub, handle) = Hub::new(&ServerConfig::default(), Arc::new(NoopHandler));

        for _ in 0..CHANNEL_BUFFER_SIZE {
            handle.send_to_all(Payload::new("x")).unwrap();
        }

        assert!(matches!(
            handle.send_to_all(Payload::new("x")),
            Err(AppError::HubBusy)
        ));
        let blocked = time::timeout(
            Duration::from_millis(50),
            handle.inbound(ConnectionId::new(), "{}".to_string()),
        )
        .await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_sends_fail_after_hub_stops() {
        let (hub, handle) = Hub::new(&ServerConfig::default(), Arc::new(NoopHandler));
        drop(hub);

        assert!(matches!(
            handle.send_to_all(Payload::new("x")),
            Err(AppError::ChannelSend)
        ));
        assert!(matches!(
            handle.connection_count().await,
            Err(AppError::ChannelSend)
        ));
    }
}
