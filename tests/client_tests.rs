#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the gateway client lifecycle.
//!
//! Uses the scripted `MockTransport`/`MockConnector` from `tests/common` and
//! paused tokio time, so handshake ordering, heartbeat cadence, and the
//! bounded reconnect schedule can be asserted against exact virtual-time
//! stamps.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use presence_client::{
    listening_filter, ConnectionState, PresenceClient, PresenceConfig, PresenceError,
    PresenceEvent, PresenceProjector, ProgressView,
};

use common::{hello_json, music_event_json, online_event_json, MockConnector, MockTransport};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Poll until the sent log holds at least `n` frames. Each iteration sleeps a
/// little virtual time, letting paused-clock auto-advance drive the client's
/// timers one deadline at a time (which keeps per-frame timestamps exact).
async fn wait_for_sent_frames(
    sent: &std::sync::Arc<std::sync::Mutex<Vec<common::SentFrame>>>,
    n: usize,
) {
    while sent.lock().unwrap().len() < n {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<PresenceEvent>) -> PresenceEvent {
    rx.recv().await.expect("event channel closed unexpectedly")
}

// ════════════════════════════════════════════════════════════════════
// Handshake ordering
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn subscribe_is_sent_before_any_heartbeat() {
    let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
    let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));

    let ev = next_event(&mut events).await;
    assert!(matches!(ev, PresenceEvent::Connected));

    // Let exactly one heartbeat go out.
    wait_for_sent_frames(&sent, 2).await;

    {
        let frames = sent.lock().unwrap();
        assert_eq!(frames[0].op(), Some(2), "first frame must be Subscribe");
        assert_eq!(frames[1].op(), Some(3), "second frame must be Heartbeat");
        assert!(
            frames[1].at - frames[0].at >= Duration::from_millis(30_000),
            "heartbeat fired before one full interval elapsed"
        );
    }

    client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_before_hello() {
    // The server streams an event but never says Hello.
    let (transport, sent, _closed) =
        MockTransport::new(vec![Some(Ok(online_event_json("U1")))]);
    let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));

    let ev = next_event(&mut events).await;
    assert!(matches!(ev, PresenceEvent::PresenceUpdate(_)));

    // Two virtual minutes pass; without a Hello nothing may beat.
    tokio::time::sleep(Duration::from_secs(120)).await;

    {
        let frames = sent.lock().unwrap();
        assert_eq!(frames.len(), 1, "only the Subscribe frame may be sent");
        assert_eq!(frames[0].op(), Some(2));
    }

    client.stop().await;
}

// ════════════════════════════════════════════════════════════════════
// Heartbeat cadence
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn exactly_one_heartbeat_per_interval() {
    let period = Duration::from_millis(30_000);
    let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(hello_json(30_000)))]);
    let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));
    let _ = next_event(&mut events).await; // Connected

    // Subscribe + six heartbeats.
    wait_for_sent_frames(&sent, 7).await;

    {
        let frames = sent.lock().unwrap();
        let subscribe_at = frames[0].at;
        let heartbeats: Vec<_> = frames.iter().filter(|f| f.op() == Some(3)).collect();
        assert!(heartbeats.len() >= 6);

        // Consecutive beats are exactly one period apart: a duplicate timer
        // would halve the gap, a restarted one would stretch it.
        for pair in heartbeats.windows(2).take(5) {
            assert_eq!(pair[1].at - pair[0].at, period);
        }

        // Advancing 5 periods yields exactly 5 beats, not more.
        let within_five = heartbeats
            .iter()
            .filter(|f| f.at <= subscribe_at + period * 5)
            .count();
        assert_eq!(within_five, 5);
    }

    client.stop().await;
}

// ════════════════════════════════════════════════════════════════════
// Bounded reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn six_closes_schedule_exactly_five_reconnects() {
    let outcomes = (0..6).map(|_| Ok(MockTransport::closing())).collect();
    let (connector, dials) = MockConnector::new(outcomes);

    let (_client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));

    // Six sessions, each ending in a clean close.
    for _ in 0..6 {
        let ev = next_event(&mut events).await;
        assert!(
            matches!(ev, PresenceEvent::Disconnected { .. }),
            "expected Disconnected, got {ev:?}"
        );
    }

    // The sixth closure exhausts the budget instead of scheduling a retry.
    let ev = next_event(&mut events).await;
    if let PresenceEvent::ReconnectsExhausted { attempts } = ev {
        assert_eq!(attempts, 5);
    } else {
        panic!("expected ReconnectsExhausted, got {ev:?}");
    }

    // Loop exited: channel closes, and no seventh dial ever happens.
    assert!(events.recv().await.is_none());
    assert_eq!(dials.load(Ordering::Relaxed), 6);
}

// ════════════════════════════════════════════════════════════════════
// Retry budget reset
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn successful_handshake_resets_the_retry_budget() {
    let mut outcomes: Vec<Result<MockTransport, PresenceError>> = Vec::new();
    // Three failed dials…
    for _ in 0..3 {
        outcomes.push(Err(PresenceError::Connect("connection refused".into())));
    }
    // …then one session that completes the handshake and closes…
    outcomes.push(Ok(
        MockTransport::new(vec![Some(Ok(hello_json(30_000))), None]).0
    ));
    // …then failures until the budget runs out again.
    for _ in 0..5 {
        outcomes.push(Err(PresenceError::Connect("connection refused".into())));
    }
    let (connector, dials) = MockConnector::new(outcomes);

    let (_client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));

    let mut connected = 0u32;
    let mut disconnected = 0u32;
    let exhausted_attempts = loop {
        match next_event(&mut events).await {
            PresenceEvent::Connected => connected += 1,
            PresenceEvent::Disconnected { .. } => disconnected += 1,
            PresenceEvent::ReconnectsExhausted { attempts } => break attempts,
            PresenceEvent::PresenceUpdate(_) => {}
        }
    };

    assert_eq!(connected, 1);
    assert_eq!(disconnected, 9);
    assert_eq!(exhausted_attempts, 5);
    // A fresh budget of 5 after the success: 4 dials before it, 5 after.
    assert_eq!(dials.load(Ordering::Relaxed), 9);
}

// ════════════════════════════════════════════════════════════════════
// Stop semantics
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn stop_during_reconnect_wait_cancels_the_retry() {
    let (connector, dials) = MockConnector::new(vec![Ok(MockTransport::closing())]);

    let (mut client, mut events) =
        PresenceClient::start(connector, PresenceConfig::new("U1"));

    // First session closes; the loop is now waiting out the 5 s delay.
    let ev = next_event(&mut events).await;
    assert!(matches!(ev, PresenceEvent::Disconnected { .. }));

    client.stop().await;
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // The retry never dials.
    assert!(events.recv().await.is_none());
    assert_eq!(dials.load(Ordering::Relaxed), 1);
}

// ════════════════════════════════════════════════════════════════════
// Event delivery under backpressure
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn backpressure_drops_routine_events_but_delivers_final_ones() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(hello_json(30_000))),
        Some(Ok(online_event_json("U1"))),
        Some(Ok(online_event_json("U1"))),
        None,
    ]);
    let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

    // Capacity 1 and a stalled receiver: Connected occupies the only slot,
    // so both updates hit a full channel. Budget of 0 makes the close
    // terminal, so the must-deliver pair queues right behind.
    let config = PresenceConfig::new("U1")
        .with_event_channel_capacity(1)
        .with_max_reconnect_attempts(0);
    let (_client, mut events) = PresenceClient::start(connector, config);

    // Let the whole session play out before draining anything.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The routine updates were dropped: draining yields Connected and then
    // goes straight to the final events, in order.
    assert!(matches!(
        next_event(&mut events).await,
        PresenceEvent::Connected
    ));
    assert!(matches!(
        next_event(&mut events).await,
        PresenceEvent::Disconnected { .. }
    ));
    if let PresenceEvent::ReconnectsExhausted { attempts } = next_event(&mut events).await {
        assert_eq!(attempts, 0);
    } else {
        panic!("expected ReconnectsExhausted");
    }
    assert!(events.recv().await.is_none());
}

// ════════════════════════════════════════════════════════════════════
// End-to-end scenario (subscribe → hello → events → progress)
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn scenario_online_then_music_session() {
    let (transport, sent, _closed) = MockTransport::new(vec![
        Some(Ok(hello_json(30_000))),
        Some(Ok(online_event_json("U1"))),
        Some(Ok(music_event_json("U1", "track-x", 1_000, 181_000))),
    ]);
    let (connector, _dials) = MockConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) = PresenceClient::start(connector, PresenceConfig::new("U1"));
    let (mut projector, view_rx) = PresenceProjector::new(listening_filter());

    let ev = next_event(&mut events).await;
    assert!(matches!(ev, PresenceEvent::Connected));

    // First event: online, no music session.
    let ev = next_event(&mut events).await;
    if let PresenceEvent::PresenceUpdate(snapshot) = ev {
        assert!(snapshot.music_session.is_none());
        projector.apply(snapshot);
    } else {
        panic!("expected PresenceUpdate, got {ev:?}");
    }
    assert!(view_rx.borrow().progress.is_none());

    // Second event: a music session appears; the listening activity is
    // filtered out of the activity list by normalization.
    let ev = next_event(&mut events).await;
    if let PresenceEvent::PresenceUpdate(snapshot) = ev {
        assert!(snapshot.activities.is_empty());
        let session = snapshot.music_session.clone().unwrap();
        assert_eq!(session.track_id, "track-x");

        // Sampled at simulated now = 91000: halfway through the track.
        let progress = ProgressView::at(&session, 91_000);
        assert_eq!(progress.position_ms, 90_000);
        assert_eq!(progress.total_ms, 180_000);
        assert!((progress.percent - 50.0).abs() < f64::EPSILON);

        projector.apply(snapshot);
    } else {
        panic!("expected PresenceUpdate, got {ev:?}");
    }
    assert!(view_rx.borrow().progress.is_some());

    // The subscribe frame named the right subject.
    {
        let frames = sent.lock().unwrap();
        let first: serde_json::Value = serde_json::from_str(&frames[0].text).unwrap();
        assert_eq!(first["d"]["subscribe_to_id"], "U1");
    }

    client.stop().await;
}
