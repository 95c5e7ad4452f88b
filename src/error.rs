//! Error types for the presence client.

use thiserror::Error;

/// Errors that can occur when using the presence client.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to establish a connection to the gateway.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to serialize or deserialize a gateway frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires a running client, but the
    /// connection loop has already exited.
    #[error("not connected to gateway")]
    NotConnected,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for presence client operations.
pub type Result<T> = std::result::Result<T, PresenceError>;
