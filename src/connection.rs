//! Connection handle definition
//!
//! The transport-owned handle the core stores in the registry: identity,
//! peer address, and the outbound frame channel feeding the socket writer.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::types::ConnectionId;

/// Outbound frames buffered per connection before sends start failing
pub const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Handle to a live connection
///
/// Cheap to clone. Identity is the [`ConnectionId`]; equality compares ids
/// only.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Remote address as reported by the socket
    pub peer_addr: String,
    /// Core → socket writer channel (encoded envelopes)
    sender: mpsc::Sender<String>,
}

impl Connection {
    /// Create a handle around an existing outbound channel
    pub fn new(id: ConnectionId, peer_addr: impl Into<String>, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            peer_addr: peer_addr.into(),
            sender,
        }
    }

    /// Create a handle with a fresh id and outbound channel
    ///
    /// The receiver belongs to the socket writer.
    pub fn channel(peer_addr: impl Into<String>) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        (Self::new(ConnectionId::new(), peer_addr, tx), rx)
    }

    /// Queue an encoded frame without waiting
    ///
    /// Never blocks on a slow client: a full queue is reported as
    /// [`SendError::Full`].
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Whether the socket writer is still running
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_send() {
        let (conn, mut rx) = Connection::channel("127.0.0.1:1");
        conn.send("hello".to_string()).unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[test]
    fn test_connection_closed_after_receiver_drop() {
        let (conn, rx) = Connection::channel("127.0.0.1:1");
        assert!(conn.is_open());
        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(conn.send("x".to_string()), Err(SendError::Closed));
    }

    #[test]
    fn test_connection_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(ConnectionId::new(), "peer", tx);
        conn.send("a".to_string()).unwrap();
        assert_eq!(conn.send("b".to_string()), Err(SendError::Full));
    }

    #[test]
    fn test_connection_identity() {
        let (a, _rx_a) = Connection::channel("peer");
        let (b, _rx_b) = Connection::channel("peer");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
