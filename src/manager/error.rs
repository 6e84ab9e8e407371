//! Error types for the feed manager.

use thiserror::Error;

/// Failure to register a new connection.
#[derive(Debug, Error, PartialEq)]
pub enum RegisterError {
    /// The welcome envelope could not be delivered, so the registration
    /// was rolled back instead of leaving a half-wired connection.
    #[error("welcome undeliverable for client '{0}', connection dropped")]
    WelcomeUndeliverable(String),
}

/// Failure to push a frame to a single connection.
///
/// Direct-send failures are informational; the caller logs and moves on.
#[derive(Debug, Error, PartialEq)]
pub enum PushError {
    #[error("client '{0}' is not connected")]
    ClientNotFound(String),
    #[error("failed to push to client '{0}': outbound queue closed")]
    PushFailed(String),
}
