//! Error types for the sync module.

use thiserror::Error;

use crate::registry::ConnectionId;

/// Errors that can occur while decoding or routing sync messages.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A frame or field exceeds its limit.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The connection is not registered.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(ConnectionId),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
