//! Shared utilities for the feed server.

pub mod logger;
pub mod time;
