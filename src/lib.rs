//! WebSocket Envelope Server Library
//!
//! A message-oriented WebSocket server built with tokio-tungstenite. Every
//! outbound message is wrapped in a `{header, payload}` envelope, liveness
//! is tracked with an application-level heartbeat, and inbound messages are
//! either handled internally (`ping`, `pong`, `disconnect`, `error`) or
//! handed to the application.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the central actor owning the connection registry
//! - The heartbeat timer ticks inside the hub loop
//! - Each connection has a `handler` task forwarding frames to the hub
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use envelope_server::{handle_connection, Hub, NoopHandler, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     let (hub, handle) = Hub::new(&config, Arc::new(NoopHandler));
//!
//!     tokio::spawn(hub.run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, handle.clone()));
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;
pub mod heartbeat;
pub mod message;
pub mod registry;
pub mod sender;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use codec::{Codec, ServerIdentity};
pub use config::ServerConfig;
pub use connection::Connection;
pub use dispatcher::{Dispatcher, MessageHandler, NoopHandler};
pub use error::{AppError, SendError};
pub use events::{EventLevel, EventSink, ServerEvent};
pub use handler::{bind, handle_connection};
pub use heartbeat::{HeartbeatMonitor, TickReport};
pub use message::{ControlCommand, Envelope, Header, Payload};
pub use registry::{ConnectionState, Registry};
pub use sender::Outbound;
pub use server::{Hub, HubCommand, HubHandle};
pub use types::{ConnectionId, LivenessStatus};
