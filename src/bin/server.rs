//! Live-score WebSocket feed server.
//!
//! Clients subscribe to named channels over `/ws`; REST producers push
//! score updates through `/api/channels/{channel}/publish`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin scorefeed-server
//! cargo run --bin scorefeed-server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use scorefeed::{
    common::logger::setup_logger,
    manager::{FeedManager, ManagerConfig},
    server::Server,
};

#[derive(Parser, Debug)]
#[command(name = "scorefeed-server")]
#[command(about = "Live-score WebSocket feed server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Heartbeat period in seconds; a connection that misses one full
    /// cycle is terminated
    #[arg(long, default_value = "30")]
    heartbeat_interval: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let manager = Arc::new(FeedManager::new(ManagerConfig {
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
    }));

    let server = Server::new(manager);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
