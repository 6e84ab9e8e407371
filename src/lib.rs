//! Live-score WebSocket feed server library.
//!
//! Tracks live client connections, lets them subscribe to named channels
//! (e.g. "nba"), fans score updates out to channel subscribers and reaps
//! unresponsive connections via a heartbeat monitor.

pub mod common;
pub mod manager;
pub mod protocol;
pub mod server;
