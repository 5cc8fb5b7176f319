//! Error types for the observer server.

use thiserror::Error;

/// Errors raised while serving observers
#[derive(Error, Debug)]
pub enum ObserverError {
    /// The listener could not bind its address
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// The WebSocket handshake with a peer failed
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// Socket-level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ObserverResult<T> = Result<T, ObserverError>;
