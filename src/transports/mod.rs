//! Transport implementations for the presence gateway.
//!
//! Concrete [`Transport`](crate::Transport) / [`Connector`](crate::Connector)
//! implementations live here behind feature gates:
//!
//! | Feature               | Types                                        |
//! |-----------------------|----------------------------------------------|
//! | `transport-websocket` | [`WebSocketTransport`], [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
