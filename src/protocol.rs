//! Wire types for the Feed the Gopher HTTP endpoints.
//!
//! Field names match the server's JSON decoders exactly, including the
//! capitalized `Value`/`User` keys of the chat endpoint.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── Endpoint paths ──────────────────────────────────────────────────

/// Persistent duplex channel carrying chat broadcasts.
pub const CONNECT_PATH: &str = "/connect";
/// Chat submission.
pub const SEND_MESSAGE_PATH: &str = "/send-message";
/// Manual click registration.
pub const REGISTER_HIT_PATH: &str = "/register-hit";
/// Auto-feeder purchase.
pub const BUILD_AUTO_FEEDER_PATH: &str = "/build-auto-feeder";
/// Ranked score snapshot.
pub const TOP_SCORERS_PATH: &str = "/top-scorers";

// ── Outbound bodies ─────────────────────────────────────────────────

/// Outbound chat message, posted to [`SEND_MESSAGE_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text.
    #[serde(rename = "Value")]
    pub value: String,
    /// Display name of the sender.
    #[serde(rename = "User")]
    pub user: String,
}

/// Click registration body, posted to [`REGISTER_HIT_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRequest {
    pub user: String,
}

/// Auto-feeder build body, posted to [`BUILD_AUTO_FEEDER_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFeederBuildRequest {
    pub user: String,
    #[serde(rename = "type")]
    pub kind: AutoFeederKind,
}

/// The auto-feeder tiers the server knows about.
///
/// Serialized as the integer tier number the server decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AutoFeederKind {
    Basic,
    Advanced,
    Industrial,
}

impl AutoFeederKind {
    /// All tiers, cheapest first.
    pub const ALL: [AutoFeederKind; 3] = [Self::Basic, Self::Advanced, Self::Industrial];

    /// Tier number used on the wire.
    pub fn tier(self) -> u8 {
        match self {
            Self::Basic => 1,
            Self::Advanced => 2,
            Self::Industrial => 3,
        }
    }

    /// Score the server deducts for one feeder of this tier.
    ///
    /// Informational only: the server decides whether a purchase succeeds.
    pub fn cost(self) -> u64 {
        match self {
            Self::Basic => 100,
            Self::Advanced => 10_000,
            Self::Industrial => 1_000_000,
        }
    }

    /// Score one feeder of this tier earns per minute.
    pub fn income_per_minute(self) -> u64 {
        match self {
            Self::Basic => 5,
            Self::Advanced => 50,
            Self::Industrial => 500,
        }
    }
}

impl From<AutoFeederKind> for u8 {
    fn from(kind: AutoFeederKind) -> Self {
        kind.tier()
    }
}

impl TryFrom<u8> for AutoFeederKind {
    type Error = String;

    fn try_from(tier: u8) -> std::result::Result<Self, Self::Error> {
        match tier {
            1 => Ok(Self::Basic),
            2 => Ok(Self::Advanced),
            3 => Ok(Self::Industrial),
            other => Err(format!("unknown auto-feeder tier {other}")),
        }
    }
}

// ── Leaderboard ─────────────────────────────────────────────────────

/// One ranked row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// 1-based position on the board.
    pub rank: u32,
    /// Display name of the player.
    pub name: String,
    /// Current score. The server stores scores as floats.
    pub value: f64,
}

impl fmt::Display for ScoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.rank, self.name, self.value)
    }
}

/// Body of the `/top-scorers` response.
///
/// The server encodes an empty board as `{"elements": null}`; that decodes
/// to an empty list here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub elements: Vec<ScoreEntry>,
}

impl Leaderboard {
    /// Decode a `/top-scorers` body and order it by rank ascending.
    ///
    /// # Errors
    ///
    /// Returns [`GopherError::Serialization`](crate::GopherError::Serialization)
    /// if the body is not a leaderboard document.
    pub fn from_json(body: &str) -> crate::Result<Self> {
        let mut board: Self = serde_json::from_str(body)?;
        board.elements.sort_by_key(|entry| entry.rank);
        Ok(board)
    }

    /// Returns `true` if nobody has scored yet.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ScoreEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ScoreEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_message_uses_capitalized_keys() {
        let msg = ChatMessage {
            value: "hi".into(),
            user: "Ava".into(),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"Value":"hi","User":"Ava"}"#
        );
    }

    #[test]
    fn hit_request_shape() {
        let body = serde_json::to_value(HitRequest { user: "Ava".into() }).unwrap();
        assert_eq!(body, json!({ "user": "Ava" }));
    }

    #[test]
    fn build_request_sends_tier_number_as_type() {
        let body = serde_json::to_value(AutoFeederBuildRequest {
            user: "Ava".into(),
            kind: AutoFeederKind::Advanced,
        })
        .unwrap();
        assert_eq!(body, json!({ "user": "Ava", "type": 2 }));
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let result = serde_json::from_str::<AutoFeederKind>("7");
        assert!(result.is_err());
        assert_eq!(AutoFeederKind::try_from(3), Ok(AutoFeederKind::Industrial));
    }

    #[test]
    fn catalogue_matches_server_prices() {
        let costs: Vec<u64> = AutoFeederKind::ALL.iter().map(|k| k.cost()).collect();
        assert_eq!(costs, vec![100, 10_000, 1_000_000]);
        assert_eq!(AutoFeederKind::Industrial.income_per_minute(), 500);
    }

    #[test]
    fn leaderboard_decodes_single_entry() {
        let board =
            Leaderboard::from_json(r#"{"elements":[{"rank":1,"name":"Ava","value":42}]}"#).unwrap();
        assert_eq!(
            board.elements,
            vec![ScoreEntry {
                rank: 1,
                name: "Ava".into(),
                value: 42.0,
            }]
        );
    }

    #[test]
    fn leaderboard_null_elements_is_empty() {
        let board = Leaderboard::from_json(r#"{"elements":null}"#).unwrap();
        assert!(board.is_empty());

        let board = Leaderboard::from_json("{}").unwrap();
        assert!(board.is_empty());
    }

    #[test]
    fn leaderboard_is_ordered_by_rank() {
        let board = Leaderboard::from_json(
            r#"{"elements":[
                {"rank":3,"name":"c","value":1},
                {"rank":1,"name":"a","value":9},
                {"rank":2,"name":"b","value":5}
            ]}"#,
        )
        .unwrap();
        let names: Vec<&str> = board.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn leaderboard_rejects_garbage() {
        let err = Leaderboard::from_json("<html>").unwrap_err();
        assert!(matches!(err, crate::GopherError::Serialization(_)));
    }

    #[test]
    fn score_entry_display_line() {
        let entry = ScoreEntry {
            rank: 2,
            name: "Gopher".into(),
            value: 12.5,
        };
        assert_eq!(entry.to_string(), "2: Gopher - 12.5");
    }
}
