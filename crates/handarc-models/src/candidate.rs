//! Candidate hands returned by the external analyzer.
//!
//! Analyzer output is untrusted: it is deserialized into these types at the
//! pipeline boundary and validated before any field is used downstream.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timecode::format_timecode_range;

/// One of the four betting rounds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    pub const ALL: [Street; 4] = [Street::Preflop, Street::Flop, Street::Turn, Street::River];

    pub fn as_str(&self) -> &'static str {
        match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "preflop" => Some(Street::Preflop),
            "flop" => Some(Street::Flop),
            "turn" => Some(Street::Turn),
            "river" => Some(Street::River),
            _ => None,
        }
    }
}

/// A player action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Fold => "fold",
            ActionType::Check => "check",
            ActionType::Call => "call",
            ActionType::Bet => "bet",
            ActionType::Raise => "raise",
            ActionType::AllIn => "all-in",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fold" => Some(ActionType::Fold),
            "check" => Some(ActionType::Check),
            "call" => Some(ActionType::Call),
            "bet" => Some(ActionType::Bet),
            "raise" => Some(ActionType::Raise),
            "all-in" | "allin" => Some(ActionType::AllIn),
            _ => None,
        }
    }
}

/// Community cards as reported by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Board {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flop: Option<[String; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub river: Option<String>,
}

impl Board {
    /// Format as the stored space-separated string ("As Kh Qd 7c 3s").
    pub fn format(&self) -> String {
        let mut cards: Vec<&str> = Vec::with_capacity(5);
        if let Some(flop) = &self.flop {
            cards.extend(flop.iter().map(String::as_str));
        }
        if let Some(turn) = &self.turn {
            cards.push(turn);
        }
        if let Some(river) = &self.river {
            cards.push(river);
        }
        cards.join(" ")
    }
}

/// A seated player in a candidate hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePlayer {
    pub name: String,
    /// Strategic position label ("BTN", "BB", "UTG", ...).
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<Vec<String>>,
    #[serde(default)]
    pub stack_start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_end: Option<i64>,
}

/// One action within a candidate hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAction {
    /// Player name as the analyzer saw it; matched against seated players
    /// by normalized name.
    pub player: String,
    pub street: Street,
    #[serde(rename = "actionType")]
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Analyzer-reported ordering hint within the hand. The persistence
    /// engine assigns its own global sequence; this is kept for auditing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
}

/// A pot winner in a candidate hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateWinner {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_description: Option<String>,
}

/// Why a candidate hand was rejected before persistence.
#[derive(Debug, Error, PartialEq)]
pub enum CandidateError {
    #[error("candidate hand has no hand number")]
    MissingHandNumber,

    #[error("hand {0}: no players")]
    NoPlayers(String),

    #[error("hand {hand}: player {index} is missing a {field}")]
    IncompletePlayer {
        hand: String,
        index: usize,
        field: &'static str,
    },

    #[error("hand {0}: no preflop actions")]
    NoPreflopActions(String),

    #[error("hand {hand}: action references unknown player '{player}'")]
    UnknownActionPlayer { hand: String, player: String },
}

/// The unvalidated structure returned by the external AI analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateHand {
    pub hand_number: String,
    /// Stakes string as shown on the broadcast ("500/1K/1K ante").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakes: Option<String>,
    /// Final pot size in chips.
    #[serde(default)]
    pub pot: i64,
    #[serde(default)]
    pub board: Board,
    #[serde(default)]
    pub players: Vec<CandidatePlayer>,
    #[serde(default)]
    pub actions: Vec<CandidateAction>,
    #[serde(default)]
    pub winners: Vec<CandidateWinner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Absolute offset of the hand start within the source video, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_end: Option<u64>,
}

impl CandidateHand {
    /// Validate the candidate before any field is trusted downstream.
    ///
    /// Rejects hands with no identifier, no players, no preflop actions,
    /// players missing a name or position, and actions referencing a player
    /// that is not seated (silently dropping those would lose data).
    pub fn validate(&self) -> Result<(), CandidateError> {
        if self.hand_number.trim().is_empty() {
            return Err(CandidateError::MissingHandNumber);
        }
        if self.players.is_empty() {
            return Err(CandidateError::NoPlayers(self.hand_number.clone()));
        }
        for (index, player) in self.players.iter().enumerate() {
            if player.name.trim().is_empty() {
                return Err(CandidateError::IncompletePlayer {
                    hand: self.hand_number.clone(),
                    index,
                    field: "name",
                });
            }
            if player.position.trim().is_empty() {
                return Err(CandidateError::IncompletePlayer {
                    hand: self.hand_number.clone(),
                    index,
                    field: "position",
                });
            }
        }
        if !self.actions.iter().any(|a| a.street == Street::Preflop) {
            return Err(CandidateError::NoPreflopActions(self.hand_number.clone()));
        }

        let seated: HashSet<String> = self
            .players
            .iter()
            .map(|p| normalize_name(&p.name))
            .collect();
        for action in &self.actions {
            if !seated.contains(&normalize_name(&action.player)) {
                return Err(CandidateError::UnknownActionPlayer {
                    hand: self.hand_number.clone(),
                    player: action.player.clone(),
                });
            }
        }
        Ok(())
    }

    /// Actions grouped by street in chronological order (preflop, flop,
    /// turn, river), preserving input order within each street.
    pub fn actions_in_street_order(&self) -> Vec<&CandidateAction> {
        let mut ordered = Vec::with_capacity(self.actions.len());
        for street in Street::ALL {
            ordered.extend(self.actions.iter().filter(|a| a.street == street));
        }
        ordered
    }

    /// Generated display description from revealed hole cards
    /// ("Ivey AsKs / Negreanu QdQc").
    pub fn description(&self) -> String {
        let described: Vec<String> = self
            .players
            .iter()
            .filter_map(|p| {
                let cards = p.hole_cards.as_ref()?;
                if cards.is_empty() {
                    return None;
                }
                Some(format!("{} {}", p.name, cards.join("")))
            })
            .collect();

        if described.is_empty() {
            "Hand".to_string()
        } else {
            described.join(" / ")
        }
    }

    /// Display timestamp for the archive ("00:12:30 ~ 00:15:10").
    pub fn timestamp_display(&self) -> String {
        match self.timestamp_start {
            Some(start) => format_timecode_range(start, self.timestamp_end),
            None => "00:00:00".to_string(),
        }
    }

    /// Whether the named player is among this hand's winners.
    pub fn is_winner(&self, name: &str) -> bool {
        let normalized = normalize_name(name);
        self.winners
            .iter()
            .any(|w| normalize_name(&w.name) == normalized)
    }

    /// Amount won by the named player, if any.
    pub fn winner_amount(&self, name: &str) -> Option<i64> {
        let normalized = normalize_name(name);
        self.winners
            .iter()
            .find(|w| normalize_name(&w.name) == normalized)
            .and_then(|w| w.amount)
    }

    /// Showdown hand description for the named winner, if the analyzer
    /// reported one.
    pub fn winner_description(&self, name: &str) -> Option<String> {
        let normalized = normalize_name(name);
        self.winners
            .iter()
            .find(|w| normalize_name(&w.name) == normalized)
            .and_then(|w| w.hand_description.clone())
    }
}

/// Normalize a player name for deduplication: lowercase with all
/// non-alphanumeric characters stripped.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Blinds parsed from a stakes string, honoring the schema constraint that
/// small/big blind are either both present (with SB <= BB) or both absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParsedBlinds {
    pub small_blind: Option<i64>,
    pub big_blind: Option<i64>,
    pub ante: Option<i64>,
}

impl ParsedBlinds {
    /// Parse "500/1k/1k ante" style stakes strings. When the analyzer got
    /// the blind order backwards the values are swapped; when only one
    /// blind is present both are dropped.
    pub fn from_stakes(stakes: Option<&str>) -> Self {
        let Some(stakes) = stakes else {
            return Self::default();
        };

        let lower = stakes.to_lowercase();
        let parts: Vec<&str> = lower.split('/').collect();

        let sb = parts
            .first()
            .and_then(|p| parse_chip_amount(p))
            .filter(|v| *v > 0);
        let bb = parts
            .get(1)
            .and_then(|p| parse_chip_amount(p))
            .filter(|v| *v > 0);

        let (small_blind, big_blind) = match (sb, bb) {
            (Some(sb), Some(bb)) if sb <= bb => (Some(sb), Some(bb)),
            (Some(sb), Some(bb)) => (Some(bb), Some(sb)),
            _ => (None, None),
        };

        let ante = parts
            .get(2)
            .map(|p| p.replace("ante", ""))
            .and_then(|p| parse_chip_amount(p.trim()))
            .filter(|v| *v >= 0);

        Self {
            small_blind,
            big_blind,
            ante,
        }
    }
}

/// Parse a chip amount string ("1500", "1.5k", "2m", "$1,500").
pub fn parse_chip_amount(s: &str) -> Option<i64> {
    let normalized = s
        .trim()
        .to_lowercase()
        .replace(['$', ','], "");
    if normalized.is_empty() {
        return None;
    }

    let (digits, multiplier) = if let Some(stripped) = normalized.strip_suffix('k') {
        (stripped, 1_000.0)
    } else if let Some(stripped) = normalized.strip_suffix('m') {
        (stripped, 1_000_000.0)
    } else {
        (normalized.as_str(), 1.0)
    };

    let value: f64 = digits.trim().parse().ok()?;
    Some((value * multiplier).floor() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> CandidateHand {
        CandidateHand {
            hand_number: "42".to_string(),
            stakes: Some("500/1k".to_string()),
            pot: 24_000,
            board: Board {
                flop: Some(["As".into(), "Kh".into(), "Qd".into()]),
                turn: Some("7c".into()),
                river: None,
            },
            players: vec![
                CandidatePlayer {
                    name: "Phil Ivey".to_string(),
                    position: "BTN".to_string(),
                    seat: Some(3),
                    hole_cards: Some(vec!["Ah".into(), "Ad".into()]),
                    stack_start: 150_000,
                    stack_end: Some(174_000),
                },
                CandidatePlayer {
                    name: "Daniel Negreanu".to_string(),
                    position: "BB".to_string(),
                    seat: Some(5),
                    hole_cards: None,
                    stack_start: 90_000,
                    stack_end: Some(66_000),
                },
            ],
            actions: vec![
                CandidateAction {
                    player: "Phil Ivey".to_string(),
                    street: Street::Preflop,
                    action: ActionType::Raise,
                    amount: Some(2_500),
                    sequence: None,
                },
                CandidateAction {
                    player: "Daniel Negreanu".to_string(),
                    street: Street::Flop,
                    action: ActionType::Check,
                    amount: None,
                    sequence: None,
                },
            ],
            winners: vec![CandidateWinner {
                name: "phil ivey".to_string(),
                amount: Some(24_000),
                hand_description: Some("set of aces".to_string()),
            }],
            confidence: Some(0.92),
            timestamp_start: Some(750),
            timestamp_end: Some(910),
        }
    }

    #[test]
    fn test_valid_candidate() {
        assert!(candidate().validate().is_ok());
    }

    #[test]
    fn test_no_players_rejected() {
        let mut hand = candidate();
        hand.players.clear();
        assert_eq!(
            hand.validate(),
            Err(CandidateError::NoPlayers("42".to_string()))
        );
    }

    #[test]
    fn test_missing_position_rejected() {
        let mut hand = candidate();
        hand.players[1].position = String::new();
        assert!(matches!(
            hand.validate(),
            Err(CandidateError::IncompletePlayer {
                field: "position",
                ..
            })
        ));
    }

    #[test]
    fn test_no_preflop_actions_rejected() {
        let mut hand = candidate();
        hand.actions.retain(|a| a.street != Street::Preflop);
        assert!(matches!(
            hand.validate(),
            Err(CandidateError::NoPreflopActions(_))
        ));
    }

    #[test]
    fn test_unknown_action_player_rejected() {
        let mut hand = candidate();
        hand.actions.push(CandidateAction {
            player: "Mystery Man".to_string(),
            street: Street::River,
            action: ActionType::Bet,
            amount: Some(1),
            sequence: None,
        });
        assert!(matches!(
            hand.validate(),
            Err(CandidateError::UnknownActionPlayer { .. })
        ));
    }

    #[test]
    fn test_street_ordering() {
        let mut hand = candidate();
        // Deliver actions out of street order
        hand.actions.reverse();
        let ordered = hand.actions_in_street_order();
        assert_eq!(ordered[0].street, Street::Preflop);
        assert_eq!(ordered[1].street, Street::Flop);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Phil Ivey"), "philivey");
        assert_eq!(normalize_name("O'Dwyer, Steve!"), "odwyersteve");
        assert_eq!(normalize_name("PHIL IVEY"), normalize_name("phil.ivey"));
    }

    #[test]
    fn test_winner_matching_ignores_case() {
        let hand = candidate();
        assert!(hand.is_winner("PHIL IVEY"));
        assert!(!hand.is_winner("Daniel Negreanu"));
        assert_eq!(hand.winner_amount("Phil Ivey"), Some(24_000));
    }

    #[test]
    fn test_board_format() {
        assert_eq!(candidate().board.format(), "As Kh Qd 7c");
    }

    #[test]
    fn test_description_uses_revealed_cards() {
        assert_eq!(candidate().description(), "Phil Ivey AhAd");
        let mut hidden = candidate();
        for p in &mut hidden.players {
            p.hole_cards = None;
        }
        assert_eq!(hidden.description(), "Hand");
    }

    #[test]
    fn test_parse_chip_amount() {
        assert_eq!(parse_chip_amount("1500"), Some(1500));
        assert_eq!(parse_chip_amount("1.5k"), Some(1500));
        assert_eq!(parse_chip_amount("2M"), Some(2_000_000));
        assert_eq!(parse_chip_amount("$1,500"), Some(1500));
        assert_eq!(parse_chip_amount("junk"), None);
    }

    #[test]
    fn test_blinds_parse() {
        let blinds = ParsedBlinds::from_stakes(Some("500/1k/1k ante"));
        assert_eq!(blinds.small_blind, Some(500));
        assert_eq!(blinds.big_blind, Some(1000));
        assert_eq!(blinds.ante, Some(1000));
    }

    #[test]
    fn test_blinds_swap_when_inverted() {
        let blinds = ParsedBlinds::from_stakes(Some("1k/500"));
        assert_eq!(blinds.small_blind, Some(500));
        assert_eq!(blinds.big_blind, Some(1000));
    }

    #[test]
    fn test_blinds_dropped_when_partial() {
        let blinds = ParsedBlinds::from_stakes(Some("500"));
        assert_eq!(blinds.small_blind, None);
        assert_eq!(blinds.big_blind, None);
    }

    #[test]
    fn test_candidate_deserializes_camel_case() {
        let json = r#"{
            "handNumber": "7",
            "pot": 1200,
            "players": [{"name": "A", "position": "BTN", "stackStart": 100}],
            "actions": [{"player": "A", "street": "preflop", "actionType": "all-in", "amount": 100}]
        }"#;
        let hand: CandidateHand = serde_json::from_str(json).unwrap();
        assert_eq!(hand.actions[0].action, ActionType::AllIn);
        assert!(hand.validate().is_ok());
    }
}
