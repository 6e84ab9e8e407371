//! Axum wiring for the live-score feed server.

mod handler;
mod runner;
mod signal;
mod state;

pub use runner::{Server, router};
pub use state::AppState;
