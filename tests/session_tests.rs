//! Integration-style session tests for the Feed the Gopher client.
//!
//! Runs whole sessions against `tests/common` mocks on a paused clock, so
//! reconnect and poll timing are deterministic.

mod common;

use std::io::Cursor;
use std::time::Duration;

use feed_the_gopher_client::sink::{dispatch, RATE_LIMIT_NOTICE};
use feed_the_gopher_client::{
    acquire_identity, ActionKind, AutoFeederKind, ClientConfig, ConnectionState,
    ExponentialBackoff, GopherEvent, LinePrompt, OverlapPolicy, ScoreEntry, Session,
    SessionIdentity,
};
use serde_json::json;
use tokio::sync::mpsc;

use common::{MockBackend, MockConnector, MockTransport, RecordingSink};

fn config() -> ClientConfig {
    ClientConfig::new("http://game.local:8080").expect("valid base url")
}

fn ava() -> SessionIdentity {
    SessionIdentity::new("Ava").expect("non-empty name")
}

/// Pull events until one matches, dispatching everything to `sink`.
async fn pump_until(
    events: &mut mpsc::Receiver<GopherEvent>,
    sink: &mut RecordingSink,
    done: impl Fn(&GopherEvent) -> bool,
) -> GopherEvent {
    loop {
        let event = events.recv().await.expect("event channel open");
        dispatch(&event, sink);
        if done(&event) {
            return event;
        }
    }
}

fn is_state(wanted: ConnectionState) -> impl Fn(&GopherEvent) -> bool {
    move |event| matches!(event, GopherEvent::ConnectionStateChanged(state) if *state == wanted)
}

// ════════════════════════════════════════════════════════════════════
// End-to-end scenario
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn ava_scenario() {
    // Name prompt: one empty answer, then "Ava".
    let mut prompt = LinePrompt::new(Cursor::new("\nAva\n"), Vec::new());
    let identity = acquire_identity(&mut prompt).expect("identity");
    assert_eq!(identity.as_str(), "Ava");

    let (transport, feed) = MockTransport::new();
    let connector = MockConnector::new(vec![Some(transport)]);
    let (backend, mut posts) = MockBackend::new(
        vec![200, 429],
        vec![r#"{"elements":[{"rank":1,"name":"Ava","value":42}]}"#],
    );

    let (mut session, mut events) =
        Session::start(identity, &config(), backend.clone(), connector.clone());
    let mut sink = RecordingSink::default();

    pump_until(&mut events, &mut sink, is_state(ConnectionState::Open)).await;
    assert_eq!(
        connector.urls.lock().unwrap().as_slice(),
        ["ws://game.local:8080/connect"]
    );

    // Chat goes out with the capitalized body.
    session.user_requests_send("hi");
    let post = posts.recv().await.expect("chat post");
    assert_eq!(post.path, "/send-message");
    assert_eq!(post.body, json!({ "Value": "hi", "User": "Ava" }));

    // The server broadcasts it back over the channel.
    feed.send(Ok("Ava: hi".into())).unwrap();
    pump_until(&mut events, &mut sink, |e| {
        matches!(e, GopherEvent::ChatFragment(_))
    })
    .await;
    assert_eq!(sink.chat_log, vec!["Ava: hi"]);

    // First poll lands after one second.
    pump_until(&mut events, &mut sink, |e| {
        matches!(e, GopherEvent::LeaderboardSnapshot(_))
    })
    .await;
    assert_eq!(
        sink.board,
        vec![ScoreEntry {
            rank: 1,
            name: "Ava".into(),
            value: 42.0,
        }]
    );

    // A rate-limited click produces exactly one notice and nothing else.
    session.user_requests_click();
    let post = posts.recv().await.expect("click post");
    assert_eq!(post.path, "/register-hit");
    assert_eq!(post.body, json!({ "user": "Ava" }));
    pump_until(&mut events, &mut sink, |e| {
        matches!(e, GopherEvent::RateLimited { .. })
    })
    .await;
    assert_eq!(sink.notices, vec![ActionKind::Click]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(posts.try_recv().is_err(), "no automatic follow-up request");
    while let Ok(event) = events.try_recv() {
        dispatch(&event, &mut sink);
    }
    assert_eq!(sink.notices.len(), 1);

    session.shutdown().await;
    assert_eq!(session.connection_state(), ConnectionState::Closed);
}

// ════════════════════════════════════════════════════════════════════
// Chat channel
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn chat_resumes_after_drop() {
    let (first, first_feed) = MockTransport::new();
    let (second, second_feed) = MockTransport::new();
    let connector = MockConnector::new(vec![Some(first), None, Some(second)]);
    let (backend, _posts) = MockBackend::new(vec![], vec![]);

    let (mut session, mut events) = Session::start(ava(), &config(), backend, connector.clone());
    let mut sink = RecordingSink::default();

    pump_until(&mut events, &mut sink, is_state(ConnectionState::Open)).await;
    first_feed.send(Ok("one".into())).unwrap();
    drop(first_feed);

    pump_until(
        &mut events,
        &mut sink,
        is_state(ConnectionState::Reconnecting),
    )
    .await;

    pump_until(&mut events, &mut sink, is_state(ConnectionState::Open)).await;
    second_feed.send(Ok("three".into())).unwrap();
    pump_until(&mut events, &mut sink, |e| {
        matches!(e, GopherEvent::ChatFragment(text) if text == "three")
    })
    .await;

    // Segment 1, failed dial, segment 2.
    assert_eq!(connector.dial_count(), 3);
    assert_eq!(sink.chat_log, vec!["one", "three"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_interval_comes_from_config() {
    let connector = MockConnector::new(vec![]);
    let (backend, _posts) = MockBackend::new(vec![], vec![]);
    let config = config().with_reconnect_interval(Duration::from_secs(10));

    let (mut session, _events) = Session::start(ava(), &config, backend, connector.clone());

    tokio::time::sleep(Duration::from_millis(25_500)).await;
    // Dials at 0 s, 10 s and 20 s.
    assert_eq!(connector.dial_count(), 3);
    assert_eq!(session.connection_state(), ConnectionState::Reconnecting);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn custom_backoff_reaches_the_chat_channel() {
    let connector = MockConnector::new(vec![]);
    let (backend, _posts) = MockBackend::new(vec![], vec![]);
    let backoff = ExponentialBackoff::new(Duration::from_secs(1), 2, Duration::from_secs(8));

    let (mut session, _events) =
        Session::start_with_backoff(ava(), &config(), backend, connector.clone(), backoff);

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    // Dials at 0 s, 1 s, 3 s and 7 s; the next one is due at 15 s.
    assert_eq!(connector.dial_count(), 4);

    session.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Actions
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn empty_chat_line_is_not_sent() {
    let (backend, mut posts) = MockBackend::new(vec![], vec![]);
    let (mut session, _events) =
        Session::start(ava(), &config(), backend, MockConnector::new(vec![]));

    session.user_requests_send("");
    session.user_requests_build(AutoFeederKind::Industrial);

    let post = posts.recv().await.expect("build post");
    assert_eq!(post.path, "/build-auto-feeder");
    assert_eq!(post.body, json!({ "user": "Ava", "type": 3 }));
    assert!(posts.try_recv().is_err());

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rate_limited_build_is_reported_once() {
    let (backend, _posts) = MockBackend::new(vec![429], vec![]);
    let (mut session, mut events) =
        Session::start(ava(), &config(), backend, MockConnector::new(vec![]));
    let mut sink = RecordingSink::default();

    session.user_requests_build(AutoFeederKind::Basic);
    let event = pump_until(&mut events, &mut sink, |e| {
        matches!(e, GopherEvent::RateLimited { .. })
    })
    .await;
    assert_eq!(
        event,
        GopherEvent::RateLimited {
            action: ActionKind::Build
        }
    );
    assert_eq!(sink.notices, vec![ActionKind::Build]);
    assert!(!RATE_LIMIT_NOTICE.is_empty());

    session.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Leaderboard
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn leaderboard_refreshes_every_second() {
    let (backend, _posts) = MockBackend::new(
        vec![],
        vec![
            r#"{"elements":[{"rank":1,"name":"Ava","value":1}]}"#,
            r#"{"elements":[{"rank":1,"name":"Bo","value":5},{"rank":2,"name":"Ava","value":2}]}"#,
            r#"{"elements":null}"#,
        ],
    );
    let config = config().with_poll_overlap(OverlapPolicy::SkipWhileInFlight);
    let (mut session, mut events) =
        Session::start(ava(), &config, backend.clone(), MockConnector::new(vec![]));

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    session.shutdown().await;

    let mut sink = RecordingSink::default();
    while let Ok(event) = events.try_recv() {
        dispatch(&event, &mut sink);
    }

    assert_eq!(backend.get_count(), 3);
    assert_eq!(sink.board_replacements, 3);
    // The last snapshot was empty and replaced the two-entry board in full.
    assert!(sink.board.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_everything() {
    let (transport, _feed) = MockTransport::new();
    let connector = MockConnector::new(vec![Some(transport)]);
    let (backend, _posts) = MockBackend::new(vec![], vec![]);
    let (mut session, mut events) =
        Session::start(ava(), &config(), backend.clone(), connector.clone());
    let mut sink = RecordingSink::default();

    pump_until(&mut events, &mut sink, is_state(ConnectionState::Open)).await;
    session.shutdown().await;
    assert_eq!(session.connection_state(), ConnectionState::Closed);

    let gets = backend.get_count();
    let dials = connector.dial_count();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.get_count(), gets);
    assert_eq!(connector.dial_count(), dials);
}
