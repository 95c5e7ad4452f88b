//! Events emitted by the presence client.

use crate::protocol::PresenceSnapshot;

/// Events delivered on the channel returned from
/// [`PresenceClient::start`](crate::client::PresenceClient::start).
///
/// Routine events may be dropped under backpressure (with a warning logged);
/// [`Disconnected`](Self::Disconnected) and
/// [`ReconnectsExhausted`](Self::ReconnectsExhausted) are always delivered.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// The handshake completed: Subscribe was sent and the server's Hello was
    /// received. Heartbeats are now running.
    Connected,
    /// A fresh presence snapshot for the subscribed subject, already
    /// normalized per the configured activity filter.
    PresenceUpdate(PresenceSnapshot),
    /// The connection ended. `reason` is `None` for a clean peer close.
    ///
    /// Unless this resulted from [`stop`](crate::client::PresenceClient::stop)
    /// or the retry budget is spent, a reconnect is already scheduled.
    Disconnected { reason: Option<String> },
    /// Terminal: `attempts` consecutive reconnects failed and no further
    /// attempt will be scheduled. A new client must be started to retry.
    ReconnectsExhausted { attempts: u32 },
}
