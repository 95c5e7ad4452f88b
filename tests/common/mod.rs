#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for presence-client integration tests.
//!
//! Provides a channel-scripted [`MockTransport`] with a timestamped send log,
//! a [`MockConnector`] that replays scripted dial outcomes, and helpers for
//! building gateway frame JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use presence_client::{Connector, PresenceError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// One frame sent by the client, with the (tokio) instant it was sent at.
/// Under `start_paused` runtimes the instant is exact virtual time, which is
/// what the heartbeat-cadence assertions rely on.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub at: tokio::time::Instant,
    pub text: String,
}

impl SentFrame {
    /// The frame's opcode, or `None` if the frame is not a JSON envelope.
    pub fn op(&self) -> Option<u64> {
        let value: serde_json::Value = serde_json::from_str(&self.text).ok()?;
        value.get("op")?.as_u64()
    }
}

/// A scripted mock transport.
///
/// `recv()` replays the scripted entries in order: `Some(Ok(_))` delivers a
/// frame, `Some(Err(_))` fails, an explicit `None` closes the connection
/// cleanly. Once the script is exhausted, `recv()` hangs so the session stays
/// alive until the client stops.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, PresenceError>>>,
    sent: Arc<StdMutex<Vec<SentFrame>>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    #[allow(clippy::type_complexity)]
    pub fn new(
        incoming: Vec<Option<Result<String, PresenceError>>>,
    ) -> (Self, Arc<StdMutex<Vec<SentFrame>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// A transport that closes immediately without delivering anything.
    pub fn closing() -> Self {
        Self::new(vec![None]).0
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), PresenceError> {
        self.sent.lock().unwrap().push(SentFrame {
            at: tokio::time::Instant::now(),
            text: frame,
        });
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PresenceError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), PresenceError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// A connector replaying scripted dial outcomes in order, counting dials.
/// Hangs once the script is exhausted (the loop never observes another
/// outcome, which keeps finished tests deterministic).
pub struct MockConnector {
    outcomes: StdMutex<VecDeque<Result<MockTransport, PresenceError>>>,
    dials: Arc<AtomicU32>,
}

impl MockConnector {
    pub fn new(
        outcomes: Vec<Result<MockTransport, PresenceError>>,
    ) -> (Self, Arc<AtomicU32>) {
        let dials = Arc::new(AtomicU32::new(0));
        let connector = Self {
            outcomes: StdMutex::new(VecDeque::from(outcomes)),
            dials: Arc::clone(&dials),
        };
        (connector, dials)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport, PresenceError> {
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(outcome) => {
                self.dials.fetch_add(1, Ordering::Relaxed);
                outcome
            }
            None => std::future::pending().await,
        }
    }
}

// ── Frame JSON helpers ──────────────────────────────────────────────

pub fn hello_json(heartbeat_interval_ms: u64) -> String {
    format!(r#"{{"op":1,"d":{{"heartbeat_interval_ms":{heartbeat_interval_ms}}}}}"#)
}

pub fn online_event_json(subject_id: &str) -> String {
    format!(
        r#"{{"op":0,"d":{{"subject_id":"{subject_id}","status":"online","activities":[],"profile":{{"display_name":"Subject One"}}}}}}"#
    )
}

pub fn music_event_json(subject_id: &str, track_id: &str, start_ms: u64, end_ms: u64) -> String {
    format!(
        concat!(
            r#"{{"op":0,"d":{{"subject_id":"{}","status":"online","activities":["#,
            r#"{{"name":"Music Service","type":2,"details":"Test Track"}}"#,
            r#"],"music_session":{{"track_id":"{}","title":"Test Track","artist":"Test Artist","start_ms":{},"end_ms":{}}},"#,
            r#""profile":{{"display_name":"Subject One"}}}}}}"#
        ),
        subject_id, track_id, start_ms, end_ms
    )
}
