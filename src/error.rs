//! Error types for RadishKV
//!
//! Provides a unified error type for the codec, server, and client.

use thiserror::Error;

/// Result type alias using RadishError
pub type Result<T> = std::result::Result<T, RadishError>;

/// Unified error type for RadishKV operations
#[derive(Debug, Error)]
pub enum RadishError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// Malformed frame. The byte stream is out of sync after this.
    #[error("Protocol error at byte {offset}: {message}")]
    Protocol { offset: usize, message: String },

    /// Unknown verb, wrong arity, or wrong argument shape
    #[error("{0}")]
    Command(String),

    // -------------------------------------------------------------------------
    // Client Errors
    // -------------------------------------------------------------------------
    #[error("Connection is not established")]
    NotConnected,

    #[error("Timed out waiting for reply")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Error reply sent by the server
    #[error("Server error: {0}")]
    Server(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    // -------------------------------------------------------------------------
    // Pool Errors
    // -------------------------------------------------------------------------
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Connection pool is closed")]
    PoolClosed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RadishError {
    pub(crate) fn protocol(offset: usize, message: impl Into<String>) -> Self {
        RadishError::Protocol {
            offset,
            message: message.into(),
        }
    }

    /// Whether the error leaves a client connection unusable
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RadishError::Io(_)
                | RadishError::Protocol { .. }
                | RadishError::Timeout
                | RadishError::ConnectionFailed(_)
                | RadishError::NotConnected
        )
    }
}
