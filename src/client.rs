//! Async client for the presence gateway protocol.
//!
//! [`PresenceClient`] is a thin handle over a background connection loop task.
//! The loop dials the gateway through a [`Connector`], performs the
//! subscribe-first handshake, heartbeats at the server-specified cadence, and
//! reconnects with a flat delay and a bounded attempt budget. Normalized
//! presence updates are emitted on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<PresenceEvent>`]) returned from
//! [`PresenceClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("wss://gateway.example.com/socket");
//! let config = PresenceConfig::new("1091441605430493185");
//! let (mut client, mut events) = PresenceClient::start(connector, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PresenceEvent::PresenceUpdate(snapshot) => { /* … */ }
//!         PresenceEvent::ReconnectsExhausted { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, warn};

use crate::event::PresenceEvent;
use crate::protocol::{listening_filter, ActivityFilter, Heartbeat, ServerFrame, Subscribe};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default delay before a reconnect attempt. Flat, not exponential.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Default bound on consecutive failed reconnect attempts.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle state of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport is open. Terminal once the retry budget is spent.
    Disconnected = 0,
    /// A connection attempt is in flight.
    Connecting = 1,
    /// The transport is open and Subscribe has been sent; waiting for Hello.
    AwaitingHello = 2,
    /// Hello received; heartbeats are running and events flow.
    Connected = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::AwaitingHello,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`PresenceClient`].
///
/// The only required field is `subject_id`; all others have defaults matching
/// the gateway's observed policy (flat 5 s reconnect delay, budget of 5).
///
/// # Example
///
/// ```
/// use presence_client::client::PresenceConfig;
/// use std::time::Duration;
///
/// let config = PresenceConfig::new("1091441605430493185")
///     .with_reconnect_delay(Duration::from_secs(2))
///     .with_event_channel_capacity(512);
/// assert_eq!(config.subject_id, "1091441605430493185");
/// ```
#[derive(Clone)]
pub struct PresenceConfig {
    /// Opaque identifier of the account to subscribe to.
    pub subject_id: String,
    /// Delay between a disconnect and the next reconnect attempt.
    /// Flat for every attempt — the gateway's policy is linear retry,
    /// not exponential backoff. Defaults to **5000 ms**.
    pub reconnect_delay: Duration,
    /// Bound on consecutive failed attempts before the client gives up.
    /// Resets to a full budget on every successful handshake.
    /// Defaults to **5**.
    pub max_reconnect_attempts: u32,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, routine events are dropped (with a
    /// warning logged) to avoid blocking the connection loop. `Disconnected`
    /// and `ReconnectsExhausted` are always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`PresenceClient::stop`] is called, the connection loop is given
    /// this much time to close the transport and emit a final `Disconnected`
    /// event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Predicate identifying the activity entry that mirrors the music
    /// session, so it can be excluded from [`PresenceSnapshot::activities`]
    /// (the session is surfaced as its own field instead). Defaults to
    /// [`listening_filter`].
    ///
    /// [`PresenceSnapshot::activities`]: crate::protocol::PresenceSnapshot::activities
    pub music_activity_filter: ActivityFilter,
}

impl PresenceConfig {
    /// Create a new configuration for the given subject with default values.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            music_activity_filter: listening_filter(),
        }
    }

    /// Set the delay between reconnect attempts.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the bound on consecutive failed reconnect attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the music-session activity predicate.
    #[must_use]
    pub fn with_music_activity_filter(mut self, filter: ActivityFilter) -> Self {
        self.music_activity_filter = filter;
        self
    }
}

impl std::fmt::Debug for PresenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceConfig")
            .field("subject_id", &self.subject_id)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the connection loop.
struct ClientShared {
    state: AtomicU8,
}

impl ClientShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async handle for the presence gateway client.
///
/// Created via [`PresenceClient::start`], which spawns the background
/// connection loop and returns this handle together with an event receiver.
/// The loop owns the transport, the heartbeat timer, and the reconnect
/// schedule; the handle only observes state and requests shutdown.
pub struct PresenceClient {
    /// Shared state updated by the connection loop.
    shared: Arc<ClientShared>,
    /// Handle to the background connection loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl PresenceClient {
    /// Start the connection loop and return a handle plus event receiver.
    ///
    /// The loop immediately dials the gateway through `connector` and sends
    /// the Subscribe frame for `config.subject_id` as its first message.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The receiver yields
    /// [`PresenceEvent`]s until the client stops or the retry budget is
    /// spent.
    #[must_use = "the event receiver must be used to receive presence updates"]
    pub fn start(
        connector: impl Connector,
        config: PresenceConfig,
    ) -> (Self, mpsc::Receiver<PresenceEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<PresenceEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(ClientShared::new());
        let loop_shared = Arc::clone(&shared);
        let shutdown_timeout = config.shutdown_timeout;

        let task = tokio::spawn(connection_loop(
            connector,
            config,
            event_tx,
            loop_shared,
            shutdown_rx,
        ));

        let client = Self {
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };

        (client, event_rx)
    }

    /// Stop the client, closing the transport and ending the connection loop.
    ///
    /// Idempotent: calling it again (or after the loop has already exited) is
    /// a no-op. No reconnect is scheduled for a stop-initiated disconnect.
    /// After this method returns, the event receiver yields any final events
    /// and then `None`.
    pub async fn stop(&mut self) {
        debug!("PresenceClient: stop requested");

        // Signal the connection loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort it
        // so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.set(ConnectionState::Disconnected);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The current lifecycle state of the connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.get()
    }

    /// Returns `true` once the handshake has completed (Hello received) and
    /// until the next disconnect.
    pub fn is_connected(&self) -> bool {
        self.shared.get() == ConnectionState::Connected
    }
}

impl std::fmt::Debug for PresenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceClient")
            .field("state", &self.connection_state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so a graceful shutdown cannot be awaited
        // here. Aborting the task drops the connection loop future, which in
        // turn drops the transport and any heartbeat timer.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// Why a session ended.
enum SessionEnd {
    /// `stop()` was requested; no reconnect.
    Stopped,
    /// The transport closed or failed; eligible for reconnect.
    Closed(Option<String>),
}

/// Background loop owning the connection lifecycle: dial, handshake, session,
/// then either a flat-delay reconnect or terminal exhaustion.
async fn connection_loop(
    connector: impl Connector,
    config: PresenceConfig,
    event_tx: mpsc::Sender<PresenceEvent>,
    shared: Arc<ClientShared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(subject_id = %config.subject_id, "connection loop started");

    // Consecutive failed attempts. One increment per failure signal — a
    // failed dial and a mid-session close count the same, and transport
    // errors surface through the close path so nothing is counted twice.
    let mut attempts: u32 = 0;

    loop {
        shared.set(ConnectionState::Connecting);
        let end = match connector.connect().await {
            Ok(transport) => {
                run_session(
                    transport,
                    &config,
                    &event_tx,
                    &shared,
                    &mut shutdown_rx,
                    &mut attempts,
                )
                .await
            }
            Err(e) => {
                error!("gateway connect failed: {e}");
                SessionEnd::Closed(Some(format!("connect failed: {e}")))
            }
        };
        shared.set(ConnectionState::Disconnected);

        match end {
            SessionEnd::Stopped => {
                emit_final(
                    &event_tx,
                    PresenceEvent::Disconnected {
                        reason: Some("client stopped".into()),
                    },
                )
                .await;
                break;
            }
            SessionEnd::Closed(reason) => {
                emit_final(&event_tx, PresenceEvent::Disconnected { reason }).await;

                if attempts >= config.max_reconnect_attempts {
                    warn!(attempts, "reconnect budget exhausted, giving up");
                    emit_final(&event_tx, PresenceEvent::ReconnectsExhausted { attempts }).await;
                    break;
                }
                attempts += 1;
                info!(
                    attempt = attempts,
                    max = config.max_reconnect_attempts,
                    delay_ms = config.reconnect_delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                tokio::select! {
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                    _ = &mut shutdown_rx => {
                        debug!("stop requested while waiting to reconnect");
                        break;
                    }
                }
            }
        }
    }

    debug!("connection loop exited");
}

/// Drive one connected session: subscribe, await Hello, heartbeat, stream
/// events. Returns when the transport closes or stop is requested.
async fn run_session(
    mut transport: impl Transport,
    config: &PresenceConfig,
    event_tx: &mpsc::Sender<PresenceEvent>,
    shared: &ClientShared,
    shutdown_rx: &mut oneshot::Receiver<()>,
    attempts: &mut u32,
) -> SessionEnd {
    shared.set(ConnectionState::AwaitingHello);

    // The client speaks first: Subscribe must be on the wire before anything
    // else — the server keys its Hello off this frame.
    let subscribe = match Subscribe::new(&config.subject_id).to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize subscribe frame: {e}");
            return SessionEnd::Closed(Some(format!("subscribe encode error: {e}")));
        }
    };
    if let Err(e) = transport.send(subscribe).await {
        error!("failed to send subscribe frame: {e}");
        return SessionEnd::Closed(Some(format!("transport send error: {e}")));
    }

    // Armed by the Hello handler. Owned by this future, so it is torn down
    // with the session — a new session can never inherit a stale timer.
    let mut heartbeat: Option<Interval> = None;

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                debug!("stop requested, closing transport");
                let _ = transport.close().await;
                return SessionEnd::Stopped;
            }

            _ = heartbeat_tick(&mut heartbeat) => {
                match Heartbeat::new().to_json() {
                    Ok(json) => {
                        debug!("sending heartbeat");
                        if let Err(e) = transport.send(json).await {
                            error!("heartbeat send failed: {e}");
                            return SessionEnd::Closed(
                                Some(format!("transport send error: {e}")),
                            );
                        }
                    }
                    Err(e) => {
                        error!("failed to serialize heartbeat frame: {e}");
                    }
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        handle_frame(
                            &text,
                            config,
                            event_tx,
                            shared,
                            attempts,
                            &mut heartbeat,
                        )
                        .await;
                    }
                    Some(Err(e)) => {
                        // Error and close are one failure signal; the caller
                        // does the attempt accounting exactly once.
                        error!("transport receive error: {e}");
                        return SessionEnd::Closed(
                            Some(format!("transport receive error: {e}")),
                        );
                    }
                    None => {
                        debug!("transport closed by peer");
                        return SessionEnd::Closed(None);
                    }
                }
            }
        }
    }
}

/// Resolve the next heartbeat tick, or never if heartbeats are not running.
async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Process one inbound frame. Malformed frames and unknown opcodes are logged
/// and dropped; they never end the session.
async fn handle_frame(
    text: &str,
    config: &PresenceConfig,
    event_tx: &mpsc::Sender<PresenceEvent>,
    shared: &ClientShared,
    attempts: &mut u32,
    heartbeat: &mut Option<Interval>,
) {
    match ServerFrame::decode(text) {
        Ok(ServerFrame::Hello(hello)) => {
            debug!(
                interval_ms = hello.heartbeat_interval_ms,
                "received hello, starting heartbeats"
            );
            let period = Duration::from_millis(hello.heartbeat_interval_ms.max(1));
            // First beat fires one full interval after Hello, never
            // immediately; replacing the interval keeps exactly one timer.
            *heartbeat = Some(interval_at(Instant::now() + period, period));
            shared.set(ConnectionState::Connected);
            *attempts = 0;
            emit_event(event_tx, PresenceEvent::Connected).await;
        }
        Ok(ServerFrame::Event(mut snapshot)) => {
            snapshot.normalize(&config.music_activity_filter);
            debug!(
                subject_id = %snapshot.subject_id,
                status = ?snapshot.status,
                has_music = snapshot.music_session.is_some(),
                "presence update"
            );
            emit_event(event_tx, PresenceEvent::PresenceUpdate(snapshot)).await;
        }
        Ok(ServerFrame::Unknown { op }) => {
            warn!(op, "ignoring frame with unknown opcode");
        }
        Err(e) => {
            warn!("dropping malformed frame: {e} — raw: {text}");
        }
    }
}

/// Emit a routine event. If the channel is full, log a warning and drop the
/// event to avoid blocking the connection loop.
async fn emit_event(event_tx: &mpsc::Sender<PresenceEvent>, event: PresenceEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit an event that must never be dropped (`Disconnected`,
/// `ReconnectsExhausted`). Uses a blocking `send().await` instead of
/// `try_send`.
async fn emit_final(event_tx: &mpsc::Sender<PresenceEvent>, event: PresenceEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::PresenceError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport & connector ──────────────────────────────────

    /// A mock transport that records sent frames and replays scripted
    /// responses. An explicit `None` entry signals a clean close.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, PresenceError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, PresenceError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, frame: String) -> std::result::Result<(), PresenceError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, PresenceError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted frames delivered — hang so the session stays
                // alive until stop is called.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), PresenceError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Connector yielding scripted dial results; hangs once exhausted.
    struct MockConnector {
        outcomes: StdMutex<VecDeque<std::result::Result<MockTransport, PresenceError>>>,
        dials: Arc<AtomicU32>,
    }

    impl MockConnector {
        fn new(
            outcomes: Vec<std::result::Result<MockTransport, PresenceError>>,
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

        async fn connect(&self) -> std::result::Result<MockTransport, PresenceError> {
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

    // ── Helpers ─────────────────────────────────────────────────────

    fn hello_json(interval_ms: u64) -> String {
        format!(r#"{{"op":1,"d":{{"heartbeat_interval_ms":{interval_ms}}}}}"#)
    }

    fn event_json() -> String {
        r#"{"op":0,"d":{"subject_id":"U1","status":"online","activities":[],"profile":{"display_name":"Subject One"}}}"#
            .to_string()
    }

    async fn recv_or_panic(rx: &mut mpsc::Receiver<PresenceEvent>) -> PresenceEvent {
        rx.recv().await.expect("event channel closed unexpectedly")
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn subscribe_is_first_frame_sent() {
        let (transport, sent, _closed) =
            MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        let event = recv_or_panic(&mut events).await;
        assert!(matches!(event, PresenceEvent::Connected));

        {
            let frames = sent.lock().unwrap();
            assert!(!frames.is_empty());
            let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
            assert_eq!(first["op"], 2);
            assert_eq!(first["d"]["subscribe_to_id"], "U1");
        }

        client.stop().await;
    }

    #[tokio::test]
    async fn connected_state_entered_on_hello() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        let _ = recv_or_panic(&mut events).await; // Connected
        assert!(client.is_connected());
        assert_eq!(client.connection_state(), ConnectionState::Connected);

        client.stop().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn presence_update_emitted_for_event_frame() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(hello_json(30_000))),
            Some(Ok(event_json())),
        ]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        let _ = recv_or_panic(&mut events).await; // Connected
        let event = recv_or_panic(&mut events).await;
        if let PresenceEvent::PresenceUpdate(snapshot) = event {
            assert_eq!(snapshot.subject_id, "U1");
            assert!(snapshot.music_session.is_none());
        } else {
            panic!("expected PresenceUpdate, got {event:?}");
        }

        client.stop().await;
    }

    #[tokio::test]
    async fn unknown_opcode_and_malformed_frames_are_dropped() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(r#"{"op":42,"d":{}}"#.to_string())),
            Some(Ok("not json at all".to_string())),
            Some(Ok(hello_json(30_000))),
            Some(Ok(event_json())),
        ]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        // Both bad frames are skipped; the session survives to Connected and
        // still delivers the update.
        let event = recv_or_panic(&mut events).await;
        assert!(matches!(event, PresenceEvent::Connected));
        let event = recv_or_panic(&mut events).await;
        assert!(matches!(event, PresenceEvent::PresenceUpdate(_)));

        client.stop().await;
    }

    #[tokio::test]
    async fn stop_emits_disconnected_and_closes_transport() {
        let (transport, _sent, closed) =
            MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        let _ = recv_or_panic(&mut events).await; // Connected
        client.stop().await;

        let event = recv_or_panic(&mut events).await;
        if let PresenceEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client stopped"));
        } else {
            panic!("expected Disconnected, got {event:?}");
        }
        assert!(closed.load(Ordering::Relaxed));
        // No reconnect after stop: the loop has exited, channel ends.
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_stop_is_idempotent() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        let _ = recv_or_panic(&mut events).await; // Connected

        client.stop().await;
        client.stop().await; // no panic, no duplicate teardown
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = PresenceConfig::new("U1");
        assert_eq!(config.subject_id, "U1");
        assert_eq!(config.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = PresenceConfig::new("U1").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn drop_without_explicit_stop() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));

        let _ = recv_or_panic(&mut events).await; // Connected

        // Dropping the handle aborts the loop; draining must not hang.
        drop(client);
        while events.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
        let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

        let (mut client, mut events) =
            PresenceClient::start(connector, PresenceConfig::new("U1"));

        let _ = recv_or_panic(&mut events).await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("PresenceClient"));
        assert!(debug_str.contains("state"));

        client.stop().await;
    }
}
