#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Tests for progress projection math and snapshot normalization, driven
//! through the public API only.

use presence_client::protocol::{Activity, ActivityKind, MusicSession, PresenceStatus};
use presence_client::{listening_filter, named_filter, PresenceSnapshot, ProgressView};

fn session(start_ms: u64, end_ms: u64) -> MusicSession {
    MusicSession {
        track_id: "track-1".into(),
        title: "Song".into(),
        artist: "Artist".into(),
        album_art_url: None,
        start_ms,
        end_ms,
    }
}

fn activity(name: &str, kind: ActivityKind) -> Activity {
    Activity {
        name: name.into(),
        kind,
        details: None,
    }
}

// ════════════════════════════════════════════════════════════════════
// Progress math
// ════════════════════════════════════════════════════════════════════

#[test]
fn position_clamps_to_zero_before_the_track_starts() {
    let s = session(100_000, 280_000);
    let p = ProgressView::at(&s, 95_000);
    assert_eq!(p.position_ms, 0);
    assert_eq!(p.total_ms, 180_000);
    assert!((p.percent - 0.0).abs() < f64::EPSILON);
}

#[test]
fn position_is_elapsed_time_mid_track() {
    let s = session(100_000, 280_000);
    let p = ProgressView::at(&s, 190_000);
    assert_eq!(p.position_ms, 90_000);
    assert!((p.percent - 50.0).abs() < f64::EPSILON);
}

#[test]
fn position_clamps_to_total_after_the_track_ends() {
    let s = session(100_000, 280_000);
    let p = ProgressView::at(&s, 290_000);
    assert_eq!(p.position_ms, 180_000);
    assert!((p.percent - 100.0).abs() < f64::EPSILON);
}

#[test]
fn zero_length_track_reports_zero_percent() {
    let s = session(100_000, 100_000);
    let p = ProgressView::at(&s, 150_000);
    assert_eq!(p.total_ms, 0);
    assert!((p.percent - 0.0).abs() < f64::EPSILON);
}

#[test]
fn track_times_render_as_minutes_and_seconds() {
    let s = session(0, 225_000);
    let p = ProgressView::at(&s, 61_000);
    assert_eq!(p.position_display(), "1:01");
    assert_eq!(p.total_display(), "3:45");
}

// ════════════════════════════════════════════════════════════════════
// Normalization
// ════════════════════════════════════════════════════════════════════

#[test]
fn listening_activities_are_removed_from_the_list() {
    let mut snapshot = PresenceSnapshot {
        subject_id: "U1".into(),
        status: PresenceStatus::Online,
        activities: vec![
            activity("Music Service", ActivityKind::Listening),
            activity("Code Editor", ActivityKind::Playing),
        ],
        music_session: Some(session(0, 180_000)),
        profile: Default::default(),
    };
    snapshot.normalize(&listening_filter());

    assert_eq!(snapshot.activities.len(), 1);
    assert_eq!(snapshot.activities[0].name, "Code Editor");
    assert!(snapshot.music_session.is_some());
}

#[test]
fn named_filter_matches_on_activity_name() {
    let mut snapshot = PresenceSnapshot {
        subject_id: "U1".into(),
        activities: vec![
            activity("Music Service", ActivityKind::Playing),
            activity("Code Editor", ActivityKind::Playing),
        ],
        ..Default::default()
    };
    snapshot.normalize(&named_filter("Music Service"));

    assert_eq!(snapshot.activities.len(), 1);
    assert_eq!(snapshot.activities[0].name, "Code Editor");
}

#[test]
fn degenerate_music_session_is_dropped() {
    let mut snapshot = PresenceSnapshot {
        subject_id: "U1".into(),
        music_session: Some(session(180_000, 180_000)),
        ..Default::default()
    };
    snapshot.normalize(&listening_filter());
    assert!(snapshot.music_session.is_none());
}

#[test]
fn primary_activity_is_the_first_remaining_one() {
    let snapshot = PresenceSnapshot {
        subject_id: "U1".into(),
        activities: vec![
            activity("Code Editor", ActivityKind::Playing),
            activity("Stream", ActivityKind::Streaming),
        ],
        ..Default::default()
    };
    assert_eq!(snapshot.primary_activity().unwrap().name, "Code Editor");

    let empty = PresenceSnapshot::default();
    assert!(empty.primary_activity().is_none());
}
