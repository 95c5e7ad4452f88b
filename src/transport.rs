//! Transport abstraction for the presence gateway.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the gateway. The protocol uses JSON text frames, so
//! every transport implementation must handle message framing internally
//! (e.g., WebSocket frames, length-prefixed TCP, QUIC streams).
//!
//! # Connection setup
//!
//! Connection setup is intentionally NOT part of [`Transport`] — different
//! transports have fundamentally different connection parameters (URLs for
//! WebSocket, host:port for TCP, QUIC endpoints). Because the client
//! reconnects after failures, it cannot accept a single pre-connected
//! transport either; it takes a [`Connector`], a factory that dials a fresh
//! transport for every attempt.
//!
//! # Implementing a custom transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use presence_client::error::PresenceError;
//! use presence_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), PresenceError> {
//!         // Send the JSON text frame over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, PresenceError>> {
//!         // Receive the next JSON text frame
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), PresenceError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector { /* endpoint parameters */ }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self) -> Result<MyTransport, PresenceError> {
//!         // Dial the gateway and return a connected transport
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::PresenceError;

/// A bidirectional text frame transport for the presence gateway protocol.
///
/// Implementors shuttle serialized JSON strings between the client and the
/// gateway. Each call to [`send`](Transport::send) transmits one complete
/// frame; each call to [`recv`](Transport::recv) returns one complete frame.
///
/// # Cancel safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::TransportSend`] if the frame could not be
    /// sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, frame: String) -> Result<(), PresenceError>;

    /// Receive the next JSON text frame from the gateway.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete frame was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the peer
    ///
    /// # Cancel safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, PresenceError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), PresenceError>;
}

/// Dials the gateway, producing a fresh [`Transport`] per connection attempt.
///
/// The connection loop calls [`connect`](Connector::connect) once at startup
/// and once per scheduled reconnect. A failed dial counts against the same
/// bounded retry budget as a mid-session close.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Establish a new connection to the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Connect`] (or a transport-specific error) if
    /// the connection cannot be established.
    async fn connect(&self) -> Result<Self::Transport, PresenceError>;
}
