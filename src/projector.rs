//! Projection of presence snapshots into a UI-ready model.
//!
//! [`PresenceProjector`] keeps the latest [`PresenceSnapshot`] and publishes a
//! [`PresenceView`] on a [`watch`] channel. While a music session is active it
//! runs a one-second tick task that recomputes the playback position, so UI
//! layers observe a continuously advancing [`ProgressView`] between server
//! pushes. The projector is the only writer of the view; any number of
//! receivers may observe it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::{ActivityFilter, MusicSession, PresenceSnapshot};

/// Cadence of the progress-tick task.
const PROGRESS_TICK: Duration = Duration::from_secs(1);

/// Current wall-clock time as epoch milliseconds.
///
/// Wire timestamps are absolute epoch milliseconds, so progress is derived
/// against the same clock.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── ProgressView ────────────────────────────────────────────────────

/// Derived playback position for an active music session.
///
/// Recomputed on every tick and on every applied snapshot; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressView {
    /// Elapsed playback time, clamped to `[0, total_ms]`.
    pub position_ms: u64,
    /// Track length in milliseconds.
    pub total_ms: u64,
    /// `position_ms / total_ms * 100`; `0.0` when `total_ms` is zero.
    pub percent: f64,
}

impl ProgressView {
    /// Compute the progress of `session` as observed at `now_ms` (epoch ms).
    ///
    /// Pure: sampling before `start_ms` yields position 0, sampling past
    /// `end_ms` yields a full bar. A zero-length session reports
    /// `percent = 0` rather than dividing by zero.
    pub fn at(session: &MusicSession, now_ms: u64) -> Self {
        let total_ms = session.duration_ms();
        let position_ms = now_ms.saturating_sub(session.start_ms).min(total_ms);
        let percent = if total_ms == 0 {
            0.0
        } else {
            position_ms as f64 / total_ms as f64 * 100.0
        };
        Self {
            position_ms,
            total_ms,
            percent,
        }
    }

    /// Elapsed time rendered as `m:ss` for display.
    pub fn position_display(&self) -> String {
        format_track_time(self.position_ms)
    }

    /// Track length rendered as `m:ss` for display.
    pub fn total_display(&self) -> String {
        format_track_time(self.total_ms)
    }
}

fn format_track_time(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    format!("{minutes}:{seconds:02}")
}

// ── PresenceView ────────────────────────────────────────────────────

/// The UI-ready model published on the projector's [`watch`] channel.
#[derive(Debug, Clone, Default)]
pub struct PresenceView {
    /// The latest normalized snapshot, or `None` before any data arrives.
    pub snapshot: Option<PresenceSnapshot>,
    /// Live playback progress while a music session is active.
    pub progress: Option<ProgressView>,
}

// ── Scoped task ─────────────────────────────────────────────────────

/// Owns at most one background task for a given role. Starting a replacement
/// aborts the previous task by construction, so duplicate concurrent timers
/// cannot exist; dropping the owner tears the task down.
#[derive(Debug, Default)]
struct ScopedTask(Option<JoinHandle<()>>);

impl ScopedTask {
    fn replace(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.0 = Some(handle);
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ── Projector ───────────────────────────────────────────────────────

/// Maintains the latest presence snapshot and derives the live progress view.
///
/// Feed it snapshots from the gateway event stream and (optionally) one
/// initial snapshot from the REST fallback; observe the result through the
/// [`watch::Receiver`] returned by [`new`](Self::new) or
/// [`subscribe`](Self::subscribe).
pub struct PresenceProjector {
    filter: ActivityFilter,
    view_tx: watch::Sender<PresenceView>,
    tick: ScopedTask,
}

impl PresenceProjector {
    /// Create a projector publishing an initially empty view.
    ///
    /// `filter` identifies the activity that mirrors the music session; use
    /// [`listening_filter`](crate::protocol::listening_filter) unless your
    /// deployment needs a different predicate.
    pub fn new(filter: ActivityFilter) -> (Self, watch::Receiver<PresenceView>) {
        let (view_tx, view_rx) = watch::channel(PresenceView::default());
        (
            Self {
                filter,
                view_tx,
                tick: ScopedTask::default(),
            },
            view_rx,
        )
    }

    /// Replace the stored snapshot and republish the view.
    ///
    /// The snapshot is normalized first (degenerate music sessions become
    /// "no session"). The view is published synchronously with freshly
    /// computed progress — the UI never waits one tick interval for its
    /// first value. A snapshot carrying a session (re)starts the one-second
    /// tick; a snapshot without one cancels it.
    pub fn apply(&mut self, mut snapshot: PresenceSnapshot) {
        snapshot.normalize(&self.filter);
        let session = snapshot.music_session.clone();

        let progress = session
            .as_ref()
            .map(|session| ProgressView::at(session, unix_millis()));
        self.view_tx.send_replace(PresenceView {
            snapshot: Some(snapshot),
            progress,
        });

        match session {
            Some(session) => self.start_tick(session),
            None => self.tick.cancel(),
        }
    }

    /// Drop the stored snapshot, cancel the tick, and publish an empty view.
    pub fn clear(&mut self) {
        self.tick.cancel();
        self.view_tx.send_replace(PresenceView::default());
    }

    /// Progress of the current music session sampled right now, or `None`
    /// when no session is active.
    pub fn current_progress(&self) -> Option<ProgressView> {
        let view = self.view_tx.borrow();
        view.snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.music_session.as_ref())
            .map(|session| ProgressView::at(session, unix_millis()))
    }

    /// An additional receiver for the published view.
    pub fn subscribe(&self) -> watch::Receiver<PresenceView> {
        self.view_tx.subscribe()
    }

    /// (Re)start the progress tick for `session`. The previous tick task, if
    /// any, is aborted before the new one starts.
    fn start_tick(&mut self, session: MusicSession) {
        debug!(track_id = %session.track_id, "starting progress tick");
        let view_tx = self.view_tx.clone();
        self.tick.replace(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_TICK);
            // The immediate first tick is redundant: `apply` already
            // published a fresh value synchronously.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let progress = ProgressView::at(&session, unix_millis());
                view_tx.send_modify(|view| view.progress = Some(progress));
            }
        }));
    }
}

impl std::fmt::Debug for PresenceProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceProjector")
            .field("has_snapshot", &self.view_tx.borrow().snapshot.is_some())
            .field("ticking", &self.tick.0.is_some())
            .finish()
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
    use crate::protocol::{listening_filter, PresenceStatus, Profile};

    fn session(track_id: &str, start_ms: u64, end_ms: u64) -> MusicSession {
        MusicSession {
            track_id: track_id.into(),
            title: "Test Track".into(),
            artist: "Test Artist".into(),
            album_art_url: None,
            start_ms,
            end_ms,
        }
    }

    fn snapshot_with(music_session: Option<MusicSession>) -> PresenceSnapshot {
        PresenceSnapshot {
            subject_id: "U1".into(),
            status: PresenceStatus::Online,
            activities: vec![],
            music_session,
            profile: Profile {
                display_name: "Subject One".into(),
                avatar_ref: None,
            },
        }
    }

    #[tokio::test]
    async fn apply_publishes_view_synchronously() {
        let (mut projector, view_rx) = PresenceProjector::new(listening_filter());

        let now = unix_millis();
        projector.apply(snapshot_with(Some(session("X", now, now + 180_000))));

        // No tick has elapsed, yet both snapshot and progress are live.
        let view = view_rx.borrow();
        assert!(view.snapshot.is_some());
        let progress = view.progress.unwrap();
        assert_eq!(progress.total_ms, 180_000);
        assert!(progress.position_ms < 5_000, "first value must be fresh");
    }

    #[tokio::test]
    async fn apply_without_session_clears_progress() {
        let (mut projector, view_rx) = PresenceProjector::new(listening_filter());

        let now = unix_millis();
        projector.apply(snapshot_with(Some(session("X", now, now + 180_000))));
        assert!(view_rx.borrow().progress.is_some());

        projector.apply(snapshot_with(None));
        assert!(view_rx.borrow().progress.is_none());
        assert!(projector.current_progress().is_none());
    }

    #[tokio::test]
    async fn degenerate_session_is_rejected_by_validation() {
        let (mut projector, view_rx) = PresenceProjector::new(listening_filter());

        // end <= start: treated as "no music session".
        projector.apply(snapshot_with(Some(session("X", 5_000, 5_000))));

        let view = view_rx.borrow();
        assert!(view.snapshot.as_ref().unwrap().music_session.is_none());
        assert!(view.progress.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_republishes_progress_every_second() {
        let (mut projector, mut view_rx) = PresenceProjector::new(listening_filter());

        let now = unix_millis();
        projector.apply(snapshot_with(Some(session("X", now, now + 180_000))));
        view_rx.mark_unchanged();

        // Each virtual second must produce a publication.
        for _ in 0..3 {
            view_rx.changed().await.unwrap();
            assert!(view_rx.borrow_and_update().progress.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn session_replacement_swaps_the_tick() {
        let (mut projector, mut view_rx) = PresenceProjector::new(listening_filter());

        let now = unix_millis();
        projector.apply(snapshot_with(Some(session("X", now, now + 60_000))));
        projector.apply(snapshot_with(Some(session("Y", now, now + 240_000))));
        view_rx.mark_unchanged();

        // Every subsequent tick derives from Y's session only.
        for _ in 0..3 {
            view_rx.changed().await.unwrap();
            let view = view_rx.borrow_and_update();
            let snapshot = view.snapshot.as_ref().unwrap();
            assert_eq!(
                snapshot.music_session.as_ref().unwrap().track_id,
                "Y"
            );
            assert_eq!(view.progress.unwrap().total_ms, 240_000);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_stops_the_tick() {
        let (mut projector, mut view_rx) = PresenceProjector::new(listening_filter());

        let now = unix_millis();
        projector.apply(snapshot_with(Some(session("X", now, now + 180_000))));
        projector.clear();
        view_rx.mark_unchanged();

        // No publication should arrive once the tick is cancelled.
        let waited = tokio::time::timeout(Duration::from_secs(5), view_rx.changed()).await;
        assert!(waited.is_err(), "tick kept publishing after clear");
        assert!(view_rx.borrow().snapshot.is_none());
    }

    #[test]
    fn track_time_formatting() {
        assert_eq!(format_track_time(0), "0:00");
        assert_eq!(format_track_time(59_999), "0:59");
        assert_eq!(format_track_time(60_000), "1:00");
        assert_eq!(format_track_time(754_000), "12:34");
    }
}
