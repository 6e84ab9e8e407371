//! WebSocket and HTTP handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        ConnectInfo, Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::manager::{ChannelInfo, ManagerStatus, OutboundFrame};

use super::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    // Create the outbound frame queue for this client
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let client_id = match state.manager.connect(addr.to_string(), tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Failed to register connection from {}: {}", addr, e);
            return;
        }
    };

    // Forward queued frames (envelopes, heartbeat pings, close) to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                OutboundFrame::Text(payload) => sender.send(Message::Text(payload.into())).await,
                OutboundFrame::Ping => sender.send(Message::Ping(Bytes::new())).await,
                OutboundFrame::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Receive from the socket and route to the manager
    let manager = state.manager.clone();
    let recv_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    // Transport errors alone don't close the connection;
                    // the stream ending or the heartbeat monitor does.
                    tracing::error!("WebSocket error on '{}': {}", recv_id, e);
                    continue;
                }
            };

            match msg {
                Message::Text(text) => manager.handle_message(&recv_id, &text).await,
                Message::Pong(_) => manager.mark_alive(&recv_id).await,
                Message::Close(_) => {
                    tracing::info!("Client '{}' requested close", recv_id);
                    break;
                }
                // Transport pings are answered automatically by axum.
                _ => {}
            }
        }
    });

    // If either task exits, abort the other
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    // Subscription bookkeeping always runs, whatever ended the socket
    state.manager.disconnect(&client_id, 1000, "socket closed").await;
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Manager snapshot for monitoring
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ManagerStatus> {
    Json(state.manager.status().await)
}

/// Active channels with their subscriber counts
pub async fn get_channels(State(state): State<Arc<AppState>>) -> Json<Vec<ChannelInfo>> {
    Json(state.manager.channels().await)
}

/// Publish a score update to a channel.
///
/// This is the external-producer path: REST callers push data here and
/// the manager fans it out to the channel's subscribers. Answers with
/// the delivered count; an unknown channel simply delivers to zero.
pub async fn publish_to_channel(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Json(data): Json<Value>,
) -> Json<Value> {
    let delivered = state.manager.broadcast(&channel, data).await;
    Json(serde_json::json!({"channel": channel, "delivered": delivered}))
}
