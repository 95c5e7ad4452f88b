//! Wire types for the presence gateway protocol.
//!
//! The gateway speaks JSON envelopes of the form `{"op": <u8>, "d": <payload>}`
//! over a persistent socket. Client-originated frames ([`Subscribe`],
//! [`Heartbeat`]) embed their opcode directly; server frames are decoded in two
//! steps (raw envelope, then typed payload) via [`ServerFrame::decode`] so that
//! unknown opcodes can be surfaced without failing the whole frame.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::Result;

// ── Opcodes ─────────────────────────────────────────────────────────

/// Gateway opcodes.
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Server → client: presence update event.
    Event = 0,
    /// Server → client: hello, carries the heartbeat cadence.
    Hello = 1,
    /// Client → server: subscribe to a subject's presence.
    Subscribe = 2,
    /// Client → server: heartbeat keep-alive.
    Heartbeat = 3,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Event),
            1 => Some(Self::Hello),
            2 => Some(Self::Subscribe),
            3 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

// ── Client → server frames ──────────────────────────────────────────

/// Subscribe request, sent immediately on connect (the client speaks first;
/// the server keys its Hello off this frame having been sent).
#[derive(Serialize, Debug)]
pub struct Subscribe {
    op: Opcode,
    d: SubscribeData,
}

#[derive(Serialize, Debug)]
struct SubscribeData {
    subscribe_to_id: String,
}

impl Subscribe {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            op: Opcode::Subscribe,
            d: SubscribeData {
                subscribe_to_id: subject_id.into(),
            },
        }
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Heartbeat keep-alive, sent once per server-specified interval.
/// Carries no payload.
#[derive(Serialize, Debug, Default)]
pub struct Heartbeat {
    op: HeartbeatOpcode,
}

/// Single-valued opcode field so `{"op": 3}` serializes without a payload key.
#[derive(Serialize_repr, Debug, Clone, Copy, Default)]
#[repr(u8)]
enum HeartbeatOpcode {
    #[default]
    Heartbeat = 3,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Server → client frames ──────────────────────────────────────────

/// Raw envelope used for the first decode step. `d` is left as an untyped
/// JSON value until the opcode is known.
#[derive(Deserialize, Debug)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Option<Value>,
}

/// Payload of the [`Hello`](Opcode::Hello) frame.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct HelloData {
    /// Heartbeat cadence mandated by the server, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

/// A decoded server frame.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    /// Hello: start heartbeating at the given cadence.
    Hello(HelloData),
    /// A complete presence snapshot for the subscribed subject.
    Event(PresenceSnapshot),
    /// An opcode this client does not handle. Logged and ignored by the
    /// connection loop, never fatal.
    Unknown { op: u8 },
}

impl ServerFrame {
    /// Decode one frame from its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Serialization`](crate::PresenceError::Serialization)
    /// if the envelope is not valid JSON or a known opcode carries a malformed
    /// payload. Unknown opcodes decode successfully as [`ServerFrame::Unknown`].
    pub fn decode(text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        match Opcode::from_u8(raw.op) {
            Some(Opcode::Hello) => {
                let data = serde_json::from_value(raw.d.unwrap_or(Value::Null))?;
                Ok(Self::Hello(data))
            }
            Some(Opcode::Event) => {
                let snapshot = serde_json::from_value(raw.d.unwrap_or(Value::Null))?;
                Ok(Self::Event(snapshot))
            }
            // Client-originated opcodes echoed back are not ours to handle.
            Some(Opcode::Subscribe) | Some(Opcode::Heartbeat) | None => {
                Ok(Self::Unknown { op: raw.op })
            }
        }
    }
}

// ── Presence data model ─────────────────────────────────────────────

/// A subject's online status.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    #[serde(rename = "dnd")]
    DoNotDisturb,
    #[default]
    Offline,
}

/// Numeric activity type codes as sent on the wire.
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivityKind {
    Playing = 0,
    Streaming = 1,
    Listening = 2,
    Watching = 3,
    Custom = 4,
    Competing = 5,
}

/// One activity entry from the subject's activity list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Display name of the activity (application or service name).
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Secondary line, if the service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// The currently playing track, if any.
///
/// `start_ms` and `end_ms` are absolute epoch milliseconds marking when
/// playback of the current track began and will end.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MusicSession {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art_url: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl MusicSession {
    /// Track length in milliseconds. Zero when the timestamps are degenerate.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// A session is only usable when its end lies after its start.
    pub fn is_valid(&self) -> bool {
        self.end_ms > self.start_ms
    }
}

/// Profile fields surfaced alongside presence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    pub display_name: String,
    /// Opaque avatar reference; resolving it to a URL is a UI concern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

/// One complete presence payload at a point in time.
///
/// Produced by the server (via an [`Event`](Opcode::Event) frame or the REST
/// fallback) and immutable once received — consumers derive from it, they do
/// not mutate it. Call [`normalize`](Self::normalize) before handing a
/// snapshot to the projector so the invariants below hold:
///
/// - `music_session` is `None` unless `end_ms > start_ms`
/// - `activities` excludes the activity mirroring the music session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PresenceSnapshot {
    /// Opaque identifier of the monitored account.
    pub subject_id: String,
    #[serde(default)]
    pub status: PresenceStatus,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_session: Option<MusicSession>,
    #[serde(default)]
    pub profile: Profile,
}

impl PresenceSnapshot {
    /// Enforce the snapshot invariants in place.
    ///
    /// Drops a music session whose timestamps are degenerate and removes
    /// activities matching `filter` (the service-specific "this activity *is*
    /// the music session" predicate). Idempotent.
    pub fn normalize(&mut self, filter: &ActivityFilter) {
        if let Some(session) = &self.music_session {
            if !session.is_valid() {
                tracing::debug!(
                    track_id = %session.track_id,
                    "dropping music session with degenerate timestamps"
                );
                self.music_session = None;
            }
        }
        self.activities.retain(|activity| !filter(activity));
    }

    /// The first non-music activity, which UI layers build their headline
    /// from. Meaningful after [`normalize`](Self::normalize).
    pub fn primary_activity(&self) -> Option<&Activity> {
        self.activities.first()
    }
}

// ── Music-session predicate ─────────────────────────────────────────

/// Predicate identifying the activity entry that mirrors the music session.
///
/// Presence services fold the now-playing track into the activity list under
/// a service-specific name or type code. That coupling is configuration, not
/// protocol: supply whatever predicate matches your deployment.
pub type ActivityFilter = Arc<dyn Fn(&Activity) -> bool + Send + Sync>;

/// Default filter: any activity with the `Listening` type code.
pub fn listening_filter() -> ActivityFilter {
    Arc::new(|activity| activity.kind == ActivityKind::Listening)
}

/// Filter matching a specific service by display name, for deployments whose
/// music integration does not use the `Listening` type code.
pub fn named_filter(name: impl Into<String>) -> ActivityFilter {
    let name = name.into();
    Arc::new(move |activity| activity.name == name)
}
