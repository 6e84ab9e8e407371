//! Server state shared across handlers.

use std::sync::Arc;

use crate::manager::FeedManager;

/// Shared application state
pub struct AppState {
    /// The connection/subscription manager
    pub manager: Arc<FeedManager>,
}
