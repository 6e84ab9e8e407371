//! Wire protocol for the live-score feed.
//!
//! All messages are JSON envelopes tagged by a `type` field. Clients
//! subscribe to named channels and receive broadcasts pushed by the
//! server; everything else is connection housekeeping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a client may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a named channel. An empty or missing channel name is a no-op.
    Subscribe {
        #[serde(default)]
        channel: String,
    },
    /// Leave a named channel.
    Unsubscribe {
        #[serde(default)]
        channel: String,
    },
    /// Application-level liveness probe, answered with `pong`.
    Ping,
    /// Generic client payload. Logged only; no response.
    Message {
        #[serde(default)]
        data: Value,
    },
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect with the assigned connection id.
    Welcome {
        client_id: String,
        timestamp: i64,
        message: String,
    },
    /// Acknowledges a subscribe.
    Subscribed { channel: String, timestamp: i64 },
    /// Acknowledges an unsubscribe.
    Unsubscribed { channel: String, timestamp: i64 },
    /// Answer to a client `ping`.
    Pong { timestamp: i64 },
    /// A channel fan-out message.
    Broadcast {
        channel: String,
        data: Value,
        timestamp: i64,
    },
    /// Reported to the offending connection on malformed input.
    Error { message: String, timestamp: i64 },
}
