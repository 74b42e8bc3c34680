#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Feed the Gopher client.
//!
//! Checks every request body the gateway produces against the JSON the
//! server decodes, and decodes leaderboard fixtures shaped like real
//! `/top-scorers` responses.

use feed_the_gopher_client::protocol::{
    BUILD_AUTO_FEEDER_PATH, CONNECT_PATH, REGISTER_HIT_PATH, SEND_MESSAGE_PATH, TOP_SCORERS_PATH,
};
use feed_the_gopher_client::{
    Action, ActionKind, AutoFeederKind, GopherError, Leaderboard, ScoreEntry, SessionIdentity,
};
use serde_json::{json, Value};

fn ava() -> SessionIdentity {
    SessionIdentity::new("Ava").unwrap()
}

fn body_of(action: &Action) -> Value {
    serde_json::from_str(&action.body().expect("serialize")).expect("valid json")
}

// ════════════════════════════════════════════════════════════════════
// Request bodies
// ════════════════════════════════════════════════════════════════════

#[test]
fn endpoint_paths() {
    assert_eq!(CONNECT_PATH, "/connect");
    assert_eq!(SEND_MESSAGE_PATH, "/send-message");
    assert_eq!(REGISTER_HIT_PATH, "/register-hit");
    assert_eq!(BUILD_AUTO_FEEDER_PATH, "/build-auto-feeder");
    assert_eq!(TOP_SCORERS_PATH, "/top-scorers");
}

#[test]
fn chat_body() {
    let action = Action::chat("hi", &ava());
    assert_eq!(action.kind(), ActionKind::Chat);
    assert_eq!(action.path(), SEND_MESSAGE_PATH);
    assert_eq!(body_of(&action), json!({ "Value": "hi", "User": "Ava" }));
}

#[test]
fn chat_body_keeps_markup_verbatim() {
    let action = Action::chat("<b>fed</b> & \"quoted\"", &ava());
    assert_eq!(
        body_of(&action)["Value"],
        json!("<b>fed</b> & \"quoted\"")
    );
}

#[test]
fn click_body() {
    let action = Action::click(&ava());
    assert_eq!(action.kind(), ActionKind::Click);
    assert_eq!(action.path(), REGISTER_HIT_PATH);
    assert_eq!(body_of(&action), json!({ "user": "Ava" }));
}

#[test]
fn build_body_for_every_tier() {
    for (kind, tier) in AutoFeederKind::ALL.into_iter().zip(1..) {
        let action = Action::build(&ava(), kind);
        assert_eq!(action.kind(), ActionKind::Build);
        assert_eq!(action.path(), BUILD_AUTO_FEEDER_PATH);
        assert_eq!(body_of(&action), json!({ "user": "Ava", "type": tier }));
    }
}

#[test]
fn tiers_are_priced_in_ascending_order() {
    let costs: Vec<u64> = AutoFeederKind::ALL.iter().map(|k| k.cost()).collect();
    assert!(costs.windows(2).all(|w| w[0] < w[1]));
}

// ════════════════════════════════════════════════════════════════════
// Leaderboard fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn leaderboard_fixture_with_fractional_scores() {
    let body = r#"{
        "elements": [
            {"rank": 1, "name": "Bo", "value": 1520.5},
            {"rank": 2, "name": "Ava", "value": 42},
            {"rank": 3, "name": "Cy", "value": 0}
        ]
    }"#;
    let board = Leaderboard::from_json(body).unwrap();

    let lines: Vec<String> = board.elements.iter().map(ScoreEntry::to_string).collect();
    assert_eq!(lines, vec!["1: Bo - 1520.5", "2: Ava - 42", "3: Cy - 0"]);
}

#[test]
fn leaderboard_empty_forms() {
    for body in [r#"{"elements":null}"#, r#"{"elements":[]}"#, "{}"] {
        let board = Leaderboard::from_json(body).unwrap();
        assert!(board.is_empty(), "{body} should decode to an empty board");
    }
}

#[test]
fn leaderboard_ignores_unknown_fields() {
    let body = r#"{"elements":[{"rank":1,"name":"Ava","value":1,"feeders":3}],"updated":"now"}"#;
    let board = Leaderboard::from_json(body).unwrap();
    assert_eq!(board.elements.len(), 1);
}

#[test]
fn leaderboard_wrong_shape_is_a_serialization_error() {
    let err = Leaderboard::from_json(r#"{"elements":{"rank":1}}"#).unwrap_err();
    assert!(matches!(err, GopherError::Serialization(_)));
}
