//! Error types for the envelope server
//!
//! Defines application-level errors and per-connection send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ConnectionId;

/// Application-level errors
///
/// The domain kinds (`MalformedEnvelope`, `UnknownConnection`,
/// `TransportWriteFailure`, `ProtocolViolation`) are handled where they are
/// detected and reported as events. Only transport startup errors are fatal.
#[derive(Debug, Error)]
pub enum AppError {
    /// Inbound text is not a parseable envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// Message or close event for a connection absent from the registry
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Writing to a connection failed at the transport level
    #[error("Write to connection {id} failed: {source}")]
    TransportWriteFailure {
        id: ConnectionId,
        #[source]
        source: SendError,
    },

    /// Recognized envelope shape used incorrectly
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - hub is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Hub command queue is full
    #[error("Hub busy")]
    HubBusy,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Per-connection send errors
///
/// Outbound frames go through a bounded channel that is never awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The write task has ended (socket closed)
    #[error("Channel closed")]
    Closed,

    /// The client is not draining its outbound queue
    #[error("Channel full")]
    Full,
}
