//! Persisted relational records.
//!
//! These mirror the database schema one-to-one. The persistence crate owns
//! the SQL; these types are plain rows so they can cross crate boundaries
//! (and the API surface) without dragging the database driver along.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{HandId, PlayerId, StreamId};

/// Lifecycle of a stream within the archive while hands are being extracted
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Analyzing,
    Completed,
    Failed,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Analyzing => "analyzing",
            StreamStatus::Completed => "completed",
            StreamStatus::Failed => "failed",
        }
    }
}

/// A deduplicated player row. `normalized_name` carries a unique constraint
/// so concurrent saves converge on one row per real-world player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    /// Display name as first seen on a broadcast.
    pub name: String,
    /// Lowercased, alphanumeric-only dedup key.
    pub normalized_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Lifetime tournament winnings, filled in by profile imports.
    pub total_winnings: i64,
    pub created_at: DateTime<Utc>,
}

/// A persisted hand row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Hand {
    pub id: HandId,
    pub stream_id: StreamId,
    pub hand_number: String,
    /// Display timestamp within the stream ("00:12:30 ~ 00:15:10").
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_blind: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub big_blind: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ante: Option<i64>,
    pub pot_size: i64,
    /// Space-separated community cards ("As Kh Qd 7c 3s"), empty when the
    /// hand ended preflop.
    pub board: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Per-hand participation row linking a hand to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandPlayer {
    pub hand_id: HandId,
    pub player_id: PlayerId,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<i16>,
    /// Space-separated hole cards when revealed ("Ah Ad").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<String>,
    pub stack_start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_end: Option<i64>,
    pub is_winner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_won: Option<i64>,
    /// Winner's showdown hand ("Full House, Aces over Kings").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_description: Option<String>,
}

/// One action row. `sequence` is globally monotonic across the whole hand,
/// not per street, so replaying actions in order needs no street sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandAction {
    pub hand_id: HandId,
    pub player_id: PlayerId,
    pub street: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub sequence: i32,
}
