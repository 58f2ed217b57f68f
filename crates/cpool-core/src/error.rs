//! Error types for connection transports

use thiserror::Error;

/// Error reported by a connection or its factory
///
/// Transports map their own failures onto these variants; the pool wraps them
/// without inspecting anything beyond the message.
#[derive(Error, Debug)]
pub enum CpoolError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl CpoolError {
    /// Whether the error means the underlying resource is gone
    pub fn is_closed(&self) -> bool {
        matches!(self, CpoolError::Closed(_))
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, CpoolError>;
