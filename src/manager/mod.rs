//! WebSocket connection and subscription manager.
//!
//! Owns the connection registry (id → live connection) and the channel
//! index (channel name → subscriber ids), routes inbound client messages,
//! fans broadcasts out to channel subscribers and reaps connections that
//! stop answering heartbeats.
//!
//! External producers (e.g. REST handlers pushing score updates) only
//! ever go through [`FeedManager::broadcast`]; the maps are mutated by
//! the manager alone, under a single lock, which is what keeps the
//! registry and the index consistent with each other.

mod connection;
mod error;

pub use connection::{Connection, FrameSender, OutboundFrame};
pub use error::{PushError, RegisterError};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::common::time::now_millis;
use crate::protocol::{ClientMessage, ServerMessage};
use connection::generate_client_id;

/// Heartbeat period used when none is configured.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Close code sent when the server shuts down gracefully.
const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code logged when a connection is reaped by the heartbeat monitor.
const CLOSE_ABNORMAL: u16 = 1006;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Period of the heartbeat monitor. A connection that misses one
    /// full cycle is terminated; there is no grace period.
    pub heartbeat_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Snapshot of manager state for monitoring endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub initialized: bool,
    pub clients: usize,
    pub channels: usize,
    pub subscriptions: usize,
    pub timestamp: i64,
}

/// One channel and its subscriber count, for the channel listing.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub channel: String,
    pub subscribers: usize,
}

/// Registry and index, guarded together so every operation sees and
/// leaves them in lockstep.
struct Inner {
    initialized: bool,
    connections: HashMap<String, Connection>,
    /// Channel name → subscriber ids. An entry exists iff its set is
    /// non-empty; empty entries are removed immediately.
    channels: HashMap<String, HashSet<String>>,
}

/// The connection/subscription manager. One instance per server.
pub struct FeedManager {
    config: ManagerConfig,
    inner: Mutex<Inner>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl FeedManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                initialized: false,
                connections: HashMap::new(),
                channels: HashMap::new(),
            }),
            heartbeat: Mutex::new(None),
        }
    }

    /// Start the heartbeat monitor. Idempotent: a second call logs a
    /// warning and changes nothing.
    pub async fn initialize(self: Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            if inner.initialized {
                tracing::warn!("Feed manager already initialized, ignoring");
                return;
            }
            inner.initialized = true;
        }

        let period = self.config.heartbeat_interval;
        let handle = tokio::spawn(heartbeat_loop(Arc::downgrade(&self), period));
        *self.heartbeat.lock().await = Some(handle);

        tracing::info!("Feed manager initialized (heartbeat every {:?})", period);
    }

    /// Register a new connection and send it the welcome envelope.
    ///
    /// Returns the assigned connection id. If the welcome cannot be
    /// delivered the registration is rolled back and the connection is
    /// dropped, never left half-wired.
    pub async fn connect(
        &self,
        remote_addr: impl Into<String>,
        sender: FrameSender,
    ) -> Result<String, RegisterError> {
        let remote_addr = remote_addr.into();
        let id = generate_client_id();
        let conn = Connection::new(id.clone(), sender, remote_addr.clone());

        let welcome = ServerMessage::Welcome {
            client_id: id.clone(),
            timestamp: conn.connected_at,
            message: "connected to scorefeed".to_string(),
        };
        let payload = serde_json::to_string(&welcome).unwrap();

        let mut inner = self.inner.lock().await;
        if conn.sender.send(OutboundFrame::Text(payload)).is_err() {
            tracing::warn!("Client '{}' dropped before welcome could be sent", id);
            return Err(RegisterError::WelcomeUndeliverable(id));
        }
        inner.connections.insert(id.clone(), conn);
        tracing::info!("Client '{}' connected from {}", id, remote_addr);
        Ok(id)
    }

    /// Remove a connection and every subscription it holds.
    ///
    /// Idempotent: a second call for the same id is a no-op. Channels
    /// whose last subscriber leaves are removed from the index.
    pub async fn disconnect(&self, client_id: &str, code: u16, reason: &str) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(conn) = inner.connections.remove(client_id) else {
            return;
        };

        for channel in &conn.channels {
            let now_empty = match inner.channels.get_mut(channel) {
                Some(subs) => {
                    subs.remove(client_id);
                    subs.is_empty()
                }
                None => false,
            };
            if now_empty {
                inner.channels.remove(channel);
            }
        }

        tracing::info!(
            "Client '{}' disconnected (code {}, reason: {})",
            client_id,
            code,
            if reason.is_empty() { "none" } else { reason }
        );
    }

    /// Route one inbound client message by its `type` field.
    ///
    /// Unknown types are logged and dropped without penalty; unparseable
    /// payloads get an `error` envelope back on the same connection.
    pub async fn handle_message(&self, client_id: &str, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { channel }) => self.subscribe(client_id, &channel).await,
            Ok(ClientMessage::Unsubscribe { channel }) => {
                self.unsubscribe(client_id, &channel).await
            }
            Ok(ClientMessage::Ping) => {
                let pong = ServerMessage::Pong {
                    timestamp: now_millis(),
                };
                if let Err(e) = self.send_to(client_id, &pong).await {
                    tracing::warn!("Failed to send pong to '{}': {}", client_id, e);
                }
            }
            Ok(ClientMessage::Message { data }) => {
                tracing::info!("Client '{}' sent message: {}", client_id, data);
            }
            Err(_) => {
                // A well-formed envelope with an unrecognized type is
                // dropped; anything else is answered with an error.
                let unknown_type = serde_json::from_str::<Value>(text)
                    .ok()
                    .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_owned));
                match unknown_type {
                    Some(kind) => {
                        tracing::warn!(
                            "Client '{}' sent unknown message type '{}', dropping",
                            client_id,
                            kind
                        );
                    }
                    None => {
                        let reply = ServerMessage::Error {
                            message: "invalid message format".to_string(),
                            timestamp: now_millis(),
                        };
                        if let Err(e) = self.send_to(client_id, &reply).await {
                            tracing::warn!(
                                "Failed to send error envelope to '{}': {}",
                                client_id,
                                e
                            );
                        }
                    }
                }
            }
        }
    }

    /// Subscribe a connection to a channel and acknowledge it.
    ///
    /// An empty channel name is a warned no-op, as is a subscribe from
    /// an id that is no longer registered.
    pub async fn subscribe(&self, client_id: &str, channel: &str) {
        if channel.is_empty() {
            tracing::warn!(
                "Client '{}' sent subscribe without a channel name, ignoring",
                client_id
            );
            return;
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(conn) = inner.connections.get_mut(client_id) else {
            tracing::warn!("Subscribe from unknown client '{}', ignoring", client_id);
            return;
        };
        conn.channels.insert(channel.to_string());
        let sender = conn.sender.clone();

        inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(client_id.to_string());

        let ack = ServerMessage::Subscribed {
            channel: channel.to_string(),
            timestamp: now_millis(),
        };
        let payload = serde_json::to_string(&ack).unwrap();
        if sender.send(OutboundFrame::Text(payload)).is_err() {
            tracing::warn!("Failed to send subscribed ack to '{}'", client_id);
        }
        tracing::debug!("Client '{}' subscribed to '{}'", client_id, channel);
    }

    /// Unsubscribe a connection from a channel and acknowledge it.
    ///
    /// The channel entry is removed from the index the moment its last
    /// subscriber leaves, so the index never accumulates empty channels.
    pub async fn unsubscribe(&self, client_id: &str, channel: &str) {
        if channel.is_empty() {
            tracing::warn!(
                "Client '{}' sent unsubscribe without a channel name, ignoring",
                client_id
            );
            return;
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(conn) = inner.connections.get_mut(client_id) else {
            tracing::warn!("Unsubscribe from unknown client '{}', ignoring", client_id);
            return;
        };
        conn.channels.remove(channel);
        let sender = conn.sender.clone();

        let now_empty = match inner.channels.get_mut(channel) {
            Some(subs) => {
                subs.remove(client_id);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.channels.remove(channel);
        }

        let ack = ServerMessage::Unsubscribed {
            channel: channel.to_string(),
            timestamp: now_millis(),
        };
        let payload = serde_json::to_string(&ack).unwrap();
        if sender.send(OutboundFrame::Text(payload)).is_err() {
            tracing::warn!("Failed to send unsubscribed ack to '{}'", client_id);
        }
        tracing::debug!("Client '{}' unsubscribed from '{}'", client_id, channel);
    }

    /// Restore a connection's liveness flag. Called when its transport
    /// pong arrives, before the next heartbeat cycle evaluates the flag.
    pub async fn mark_alive(&self, client_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(conn) = inner.connections.get_mut(client_id) {
            conn.alive = true;
        }
    }

    /// Run one heartbeat monitor pass.
    ///
    /// Connections whose liveness flag is still down from the previous
    /// pass are terminated, with their subscriptions removed; everyone
    /// else has the flag lowered and gets a ping. A connection whose
    /// ping cannot even be queued is unusable and is terminated too.
    pub async fn run_heartbeat_cycle(&self) {
        let mut timed_out = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            for conn in inner.connections.values_mut() {
                if !conn.alive {
                    timed_out.push(conn.id.clone());
                    continue;
                }
                conn.alive = false;
                if conn.sender.send(OutboundFrame::Ping).is_err() {
                    timed_out.push(conn.id.clone());
                }
            }
        }

        for id in timed_out {
            tracing::warn!("Client '{}' failed heartbeat, terminating", id);
            self.disconnect(&id, CLOSE_ABNORMAL, "heartbeat timeout").await;
        }
    }

    /// Fan a message out to every subscriber of `channel`.
    ///
    /// The envelope is serialized once and the identical payload sent to
    /// each subscriber. Per-subscriber send failures are logged and
    /// skipped. Returns the number of connections the message reached;
    /// an unknown channel is a normal empty result, not an error.
    pub async fn broadcast(&self, channel: &str, data: Value) -> usize {
        let envelope = ServerMessage::Broadcast {
            channel: channel.to_string(),
            data,
            timestamp: now_millis(),
        };
        let payload = serde_json::to_string(&envelope).unwrap();

        let inner = self.inner.lock().await;
        let Some(subscribers) = inner.channels.get(channel) else {
            tracing::debug!("Broadcast on '{}' matched no subscribers", channel);
            return 0;
        };

        let mut delivered = 0;
        for id in subscribers {
            match inner.connections.get(id) {
                Some(conn) => {
                    if conn.sender.send(OutboundFrame::Text(payload.clone())).is_ok() {
                        delivered += 1;
                    } else {
                        tracing::warn!("Failed to broadcast to client '{}' on '{}'", id, channel);
                    }
                }
                None => {
                    tracing::warn!(
                        "Client '{}' indexed under '{}' but not registered, skipping",
                        id,
                        channel
                    );
                }
            }
        }

        tracing::debug!("Broadcast on '{}' delivered to {} client(s)", channel, delivered);
        delivered
    }

    /// Send one envelope to a single connection.
    pub async fn send_to(&self, client_id: &str, msg: &ServerMessage) -> Result<(), PushError> {
        let inner = self.inner.lock().await;
        let Some(conn) = inner.connections.get(client_id) else {
            return Err(PushError::ClientNotFound(client_id.to_string()));
        };
        let payload = serde_json::to_string(msg).unwrap();
        conn.sender
            .send(OutboundFrame::Text(payload))
            .map_err(|_| PushError::PushFailed(client_id.to_string()))
    }

    /// Number of live connections.
    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    /// Total subscriptions across all channels.
    pub async fn subscription_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.channels.values().map(HashSet::len).sum()
    }

    /// Active channels with their subscriber counts, sorted by name.
    pub async fn channels(&self) -> Vec<ChannelInfo> {
        let inner = self.inner.lock().await;
        let mut channels: Vec<ChannelInfo> = inner
            .channels
            .iter()
            .map(|(name, subs)| ChannelInfo {
                channel: name.clone(),
                subscribers: subs.len(),
            })
            .collect();
        channels.sort_by(|a, b| a.channel.cmp(&b.channel));
        channels
    }

    /// Point-in-time snapshot for monitoring endpoints.
    pub async fn status(&self) -> ManagerStatus {
        let inner = self.inner.lock().await;
        ManagerStatus {
            initialized: inner.initialized,
            clients: inner.connections.len(),
            channels: inner.channels.len(),
            subscriptions: inner.channels.values().map(HashSet::len).sum(),
            timestamp: now_millis(),
        }
    }

    /// Stop the heartbeat monitor, close every connection with a 1001
    /// (going away) and clear all state.
    pub async fn cleanup(&self) {
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }

        let mut inner = self.inner.lock().await;
        for conn in inner.connections.values() {
            let _ = conn.sender.send(OutboundFrame::Close {
                code: CLOSE_GOING_AWAY,
                reason: "server shutting down".to_string(),
            });
        }
        let closed = inner.connections.len();
        inner.connections.clear();
        inner.channels.clear();
        inner.initialized = false;

        tracing::info!("Feed manager cleaned up ({} connection(s) closed)", closed);
    }
}

/// Periodic heartbeat driver. Holds only a weak reference so a dropped
/// manager stops the loop instead of being kept alive by it.
async fn heartbeat_loop(manager: Weak<FeedManager>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; skip it so every connection gets
    // a full period before its first liveness check.
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.run_heartbeat_cycle().await;
    }
}
