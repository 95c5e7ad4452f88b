//! # Presence Client
//!
//! Async Rust client for gateway-style presence services: live online status,
//! activities, and now-playing music metadata streamed over a persistent
//! socket, projected into a UI-ready model.
//!
//! ## Features
//!
//! - **Gateway client** — subscribe-first handshake, server-paced heartbeats,
//!   flat-delay bounded reconnection, typed [`PresenceEvent`] stream
//! - **Presence projector** — normalizes snapshots and derives a live
//!   playback-progress view on a `watch` channel
//! - **REST fallback** — one-shot snapshot fetch to paint the UI before the
//!   socket handshake completes (`rest-fallback` feature)
//! - **Transport-agnostic** — implement [`Transport`]/[`Connector`] for any
//!   backend; `transport-websocket` feature provides the built-in WebSocket
//!   pair
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use presence_client::{
//!     PresenceClient, PresenceConfig, PresenceEvent, PresenceProjector,
//!     RestFetcher, WebSocketConnector, listening_filter,
//! };
//!
//! // Paint an initial view before the socket is up.
//! let fetcher = RestFetcher::new("https://presence.example.com");
//! let (mut projector, view) = PresenceProjector::new(listening_filter());
//! if let Some(initial) = fetcher.fetch("1091441605430493185").await {
//!     projector.apply(initial);
//! }
//!
//! // Stream live updates, superseding the initial snapshot.
//! let connector = WebSocketConnector::new("wss://presence.example.com/socket");
//! let (mut client, mut events) =
//!     PresenceClient::start(connector, PresenceConfig::new("1091441605430493185"));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PresenceEvent::PresenceUpdate(snapshot) => projector.apply(snapshot),
//!         PresenceEvent::ReconnectsExhausted { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod projector;
pub mod protocol;
#[cfg(feature = "rest-fallback")]
pub mod rest;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{ConnectionState, PresenceClient, PresenceConfig};
pub use error::PresenceError;
pub use event::PresenceEvent;
pub use projector::{PresenceProjector, PresenceView, ProgressView};
pub use protocol::{listening_filter, named_filter, ActivityFilter, PresenceSnapshot};
pub use transport::{Connector, Transport};

#[cfg(feature = "rest-fallback")]
pub use rest::RestFetcher;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
