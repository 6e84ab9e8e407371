//! Server execution logic.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::manager::FeedManager;

use super::{
    handler::{get_channels, get_status, health_check, publish_to_channel, ws_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Build the feed server router.
///
/// Exposed so tests can serve the same router on an ephemeral port.
pub fn router(manager: Arc<FeedManager>) -> Router {
    let app_state = Arc::new(AppState { manager });

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/channels", get(get_channels))
        .route("/api/channels/{channel}/publish", post(publish_to_channel))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Live-score feed server.
pub struct Server {
    manager: Arc<FeedManager>,
}

impl Server {
    pub fn new(manager: Arc<FeedManager>) -> Self {
        Self { manager }
    }

    /// Run the feed server until a shutdown signal arrives, then clean
    /// up the manager (heartbeat stopped, connections closed with 1001).
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified
    /// address or if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        self.manager.clone().initialize().await;

        let app = router(self.manager.clone());

        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!(
            "Live-score feed server listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.manager.cleanup().await;
        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
