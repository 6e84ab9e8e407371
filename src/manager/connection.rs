//! Per-connection state owned by the feed manager.

use std::collections::HashSet;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::time::now_millis;

/// A frame queued for delivery to one client's socket task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// A serialized JSON envelope.
    Text(String),
    /// Transport-level heartbeat probe.
    Ping,
    /// Ask the socket task to close the connection.
    Close { code: u16, reason: String },
}

/// Sender half of a connection's outbound frame queue.
pub type FrameSender = mpsc::UnboundedSender<OutboundFrame>;

/// One live client session.
pub struct Connection {
    /// Process-unique connection id, assigned at connect time.
    pub id: String,
    /// Outbound queue consumed by the connection's socket task.
    pub sender: FrameSender,
    /// Cleared at the start of each heartbeat cycle, restored by a pong.
    /// A connection found with this flag still down is reaped.
    pub alive: bool,
    /// Channels this connection currently subscribes to. Kept in
    /// lockstep with the manager's channel index.
    pub channels: HashSet<String>,
    pub remote_addr: String,
    /// Unix timestamp (ms) when the connection was registered.
    pub connected_at: i64,
}

impl Connection {
    pub fn new(id: String, sender: FrameSender, remote_addr: String) -> Self {
        Self {
            id,
            sender,
            alive: true,
            channels: HashSet::new(),
            remote_addr,
            connected_at: now_millis(),
        }
    }
}

/// Generate a connection id from the connect-time milliseconds plus a
/// random suffix. Uniqueness is best-effort, not guaranteed.
pub fn generate_client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_client_id_has_timestamp_and_suffix() {
        // given (precondition): nothing

        // when (operation):
        let id = generate_client_id();

        // then (expected result): "<millis>-<8 hex chars>"
        let (millis, suffix) = id.split_once('-').expect("id should contain a dash");
        assert!(millis.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_client_id_is_unique_in_practice() {
        // given (precondition):
        let id1 = generate_client_id();

        // when (operation):
        let id2 = generate_client_id();

        // then (expected result):
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_connection_starts_alive_with_no_channels() {
        // given (precondition):
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (operation):
        let conn = Connection::new("c1".to_string(), tx, "127.0.0.1:9000".to_string());

        // then (expected result):
        assert!(conn.alive);
        assert!(conn.channels.is_empty());
        assert!(conn.connected_at > 0);
    }
}
