//! Basic type definitions for the envelope server
//!
//! Provides:
//! - `ConnectionId`: UUID-based unique connection identifier
//! - `LivenessStatus`: per-connection heartbeat state

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 so two connections can never alias each other's
/// registry entry. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Heartbeat liveness of a connection
///
/// `Alive` means the peer answered since the last probe, `PendingProbe`
/// means a probe is outstanding, `Dead` means two probes went unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessStatus {
    #[default]
    Alive,
    PendingProbe,
    Dead,
}

impl std::fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LivenessStatus::Alive => "alive",
            LivenessStatus::PendingProbe => "pending",
            LivenessStatus::Dead => "dead",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_liveness_default_is_alive() {
        assert_eq!(LivenessStatus::default(), LivenessStatus::Alive);
    }

    #[test]
    fn test_liveness_display() {
        assert_eq!(LivenessStatus::PendingProbe.to_string(), "pending");
        assert_eq!(LivenessStatus::Dead.to_string(), "dead");
    }
}
