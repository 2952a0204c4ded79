//! Connection registry
//!
//! Maps every live connection to its [`ConnectionState`]. Owned by the hub
//! actor, so all access is serialized without locks.

use std::collections::HashMap;

use crate::connection::Connection;
use crate::types::{ConnectionId, LivenessStatus};

/// Per-connection bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: LivenessStatus,
}

#[derive(Debug)]
struct Entry {
    connection: Connection,
    state: ConnectionState,
}

/// Authoritative map of live connections
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<ConnectionId, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted connection as `Alive`
    ///
    /// Callers must not register the same connection twice.
    pub fn register(&mut self, connection: Connection) {
        self.entries.insert(
            connection.id,
            Entry {
                connection,
                state: ConnectionState::default(),
            },
        );
    }

    /// Stop tracking a connection, returning its handle if it was present
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        self.entries.remove(&id).map(|entry| entry.connection)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionState> {
        self.entries.get(&id).map(|entry| &entry.state)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.entries.get(&id).map(|entry| &entry.connection)
    }

    /// Update liveness; silently ignored if the connection already closed
    pub fn set_status(&mut self, id: ConnectionId, status: LivenessStatus) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state.status = status;
        }
    }

    /// Visit every connection (unspecified order)
    pub fn for_each<F>(&mut self, mut visitor: F)
    where
        F: FnMut(&Connection, &mut ConnectionState),
    {
        for entry in self.entries.values_mut() {
            visitor(&entry.connection, &mut entry.state);
        }
    }

    /// Visit the connections matching `predicate`
    pub fn for_each_filtered<P, F>(&mut self, mut predicate: P, mut visitor: F)
    where
        P: FnMut(&Connection) -> bool,
        F: FnMut(&Connection, &mut ConnectionState),
    {
        self.for_each(|connection, state| {
            if predicate(connection) {
                visitor(connection, state);
            }
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_alive() {
        let mut registry = Registry::new();
        let (conn, _rx) = Connection::channel("peer");
        let id = conn.id;

        registry.register(conn);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().status, LivenessStatus::Alive);
        assert_eq!(registry.connection(id).unwrap().id, id);
    }

    #[test]
    fn test_unregister_removes_state() {
        let mut registry = Registry::new();
        let (conn, _rx) = Connection::channel("peer");
        let id = conn.id;
        registry.register(conn);

        assert!(registry.unregister(id).is_some());
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());

        // Second removal is a no-op
        assert!(registry.unregister(id).is_none());
    }

    #[test]
    fn test_set_status_on_unknown_is_noop() {
        let mut registry = Registry::new();
        let id = ConnectionId::new();
        registry.set_status(id, LivenessStatus::Dead);
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_status() {
        let mut registry = Registry::new();
        let (conn, _rx) = Connection::channel("peer");
        let id = conn.id;
        registry.register(conn);

        registry.set_status(id, LivenessStatus::PendingProbe);
        assert_eq!(registry.get(id).unwrap().status, LivenessStatus::PendingProbe);
    }

    #[test]
    fn test_one_state_per_connection() {
        let mut registry = Registry::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (conn, rx) = Connection::channel("peer");
            registry.register(conn);
            receivers.push(rx);
        }

        let mut visited = 0;
        registry.for_each(|_, state| {
            assert_eq!(state.status, LivenessStatus::Alive);
            visited += 1;
        });
        assert_eq!(visited, 5);
    }

    #[test]
    fn test_for_each_filtered() {
        let mut registry = Registry::new();
        let (a, _rx_a) = Connection::channel("a");
        let (b, _rx_b) = Connection::channel("b");
        let a_id = a.id;
        registry.register(a);
        registry.register(b);

        let mut seen = Vec::new();
        registry.for_each_filtered(|c| c.id == a_id, |c, _| seen.push(c.id));
        assert_eq!(seen, vec![a_id]);
    }
}
