//! Multi-row hand save protocol.
//!
//! A hand spans four tables (players, hands, hand_players, hand_actions)
//! inserted in dependency order. There is no cross-table transaction at
//! this layer: if a later insert fails, previously inserted rows for the
//! hand are removed by compensating deletes in reverse order, so a hand is
//! either fully present or fully absent. Player rows are shared across
//! hands and are never compensated.

use tracing::{info, warn};

use handarc_models::{
    normalize_name, CandidateHand, HandId, ParsedBlinds, Player, StreamId,
};

use crate::error::{DbError, DbResult};
use crate::store::{HandStore, NewHand, NewHandAction, NewHandPlayer};

/// Options for the save protocol.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Skip hands whose (stream, timestamp) already exists instead of
    /// failing on the unique constraint.
    pub skip_duplicates: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
        }
    }
}

/// Result of saving one candidate hand.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved {
        hand_id: HandId,
        hand_number: String,
        confidence: Option<f64>,
    },
    /// A hand at this (stream, timestamp) already exists.
    SkippedDuplicate,
}

/// Summary of saving a batch of candidate hands.
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    pub total: u32,
    pub saved: Vec<SaveOutcome>,
    pub skipped: u32,
    pub failed: u32,
    /// One message per failed hand, in input order.
    pub errors: Vec<String>,
}

impl SaveReport {
    pub fn saved_count(&self) -> u32 {
        self.saved.len() as u32
    }

    /// Fraction of candidates that persisted, 0.0-1.0.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.saved_count() as f64 / self.total as f64
        }
    }
}

/// Rows to remove if a later step of the save fails, unwound in reverse
/// registration order.
enum Compensation {
    HandActions(HandId),
    HandPlayers(HandId),
    Hand(HandId),
}

/// Applies the save protocol over any [`HandStore`].
pub struct HandSaver<S> {
    store: S,
    options: SaveOptions,
}

impl<S: HandStore> HandSaver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: SaveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SaveOptions) -> Self {
        self.options = options;
        self
    }

    /// Save one validated candidate hand.
    pub async fn persist_hand(
        &self,
        stream_id: &StreamId,
        hand: &CandidateHand,
    ) -> DbResult<SaveOutcome> {
        hand.validate()?;

        let timestamp = hand.timestamp_display();
        if self.options.skip_duplicates && self.store.hand_exists(stream_id, &timestamp).await? {
            info!(
                "Hand {} at {} already archived, skipping",
                hand.hand_number, timestamp
            );
            return Ok(SaveOutcome::SkippedDuplicate);
        }

        // Resolve every seated player to a row before touching hand tables.
        // Shared player rows are not compensated on failure.
        let mut players = Vec::with_capacity(hand.players.len());
        for candidate in &hand.players {
            players.push(self.resolve_player(&candidate.name).await?);
        }

        let blinds = ParsedBlinds::from_stakes(hand.stakes.as_deref());
        let mut compensations: Vec<Compensation> = Vec::new();

        let result = self
            .insert_hand_rows(stream_id, hand, &timestamp, &blinds, &players, &mut compensations)
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.unwind(compensations, &e).await?;
                Err(e)
            }
        }
    }

    async fn insert_hand_rows(
        &self,
        stream_id: &StreamId,
        hand: &CandidateHand,
        timestamp: &str,
        blinds: &ParsedBlinds,
        players: &[Player],
        compensations: &mut Vec<Compensation>,
    ) -> DbResult<SaveOutcome> {
        let row = self
            .store
            .insert_hand(&NewHand {
                stream_id: stream_id.clone(),
                hand_number: hand.hand_number.clone(),
                timestamp: timestamp.to_string(),
                description: Some(hand.description()),
                small_blind: blinds.small_blind,
                big_blind: blinds.big_blind,
                ante: blinds.ante,
                pot_size: hand.pot,
                board: hand.board.format(),
                confidence: hand.confidence,
            })
            .await?;
        let hand_id = row.id;
        compensations.push(Compensation::Hand(hand_id));

        let player_rows: Vec<NewHandPlayer> = hand
            .players
            .iter()
            .zip(players)
            .map(|(candidate, player)| NewHandPlayer {
                hand_id,
                player_id: player.id,
                position: candidate.position.clone(),
                seat: candidate.seat.map(i16::from),
                hole_cards: candidate
                    .hole_cards
                    .as_ref()
                    .filter(|c| !c.is_empty())
                    .map(|c| c.join(" ")),
                stack_start: candidate.stack_start,
                stack_end: candidate.stack_end,
                is_winner: hand.is_winner(&candidate.name),
                amount_won: hand.winner_amount(&candidate.name),
                hand_description: hand.winner_description(&candidate.name),
            })
            .collect();
        compensations.push(Compensation::HandPlayers(hand_id));
        self.store.insert_hand_players(&player_rows).await?;

        // Actions get a globally monotonic sequence across streets, in
        // chronological street order regardless of input order
        let mut action_rows = Vec::with_capacity(hand.actions.len());
        for (sequence, action) in hand.actions_in_street_order().iter().enumerate() {
            let player = self.match_player(players, &action.player, hand)?;
            action_rows.push(NewHandAction {
                hand_id,
                player_id: player.id,
                street: action.street.as_str().to_string(),
                action_type: action.action.as_str().to_string(),
                amount: action.amount,
                sequence: sequence as i32,
            });
        }
        compensations.push(Compensation::HandActions(hand_id));
        self.store.insert_hand_actions(&action_rows).await?;

        info!(
            "Archived hand {} ({} players, {} actions) as {}",
            hand.hand_number,
            player_rows.len(),
            action_rows.len(),
            hand_id
        );

        Ok(SaveOutcome::Saved {
            hand_id,
            hand_number: hand.hand_number.clone(),
            confidence: hand.confidence,
        })
    }

    fn match_player<'a>(
        &self,
        players: &'a [Player],
        name: &str,
        hand: &CandidateHand,
    ) -> DbResult<&'a Player> {
        let normalized = normalize_name(name);
        players
            .iter()
            .find(|p| p.normalized_name == normalized)
            .ok_or_else(|| {
                // validate() checks this, but the resolved set is what counts
                DbError::InvalidCandidate(handarc_models::CandidateError::UnknownActionPlayer {
                    hand: hand.hand_number.clone(),
                    player: name.to_string(),
                })
            })
    }

    /// Find or create the player row for a name. Creation can lose a race
    /// against a concurrent save of the same player; the unique constraint
    /// converts that into a re-read.
    async fn resolve_player(&self, name: &str) -> DbResult<Player> {
        let normalized = normalize_name(name);
        if let Some(player) = self.store.find_player_by_normalized_name(&normalized).await? {
            return Ok(player);
        }
        match self.store.insert_player(name, &normalized).await {
            Ok(player) => Ok(player),
            Err(DbError::UniqueViolation { .. }) => self
                .store
                .find_player_by_normalized_name(&normalized)
                .await?
                .ok_or_else(|| DbError::not_found("player", normalized)),
            Err(e) => Err(e),
        }
    }

    /// Run compensating deletes in reverse order. Each delete gets one
    /// retry on a transient error; a permanent delete failure escalates to
    /// [`DbError::RollbackIncomplete`] since rows were left behind.
    async fn unwind(&self, compensations: Vec<Compensation>, cause: &DbError) -> DbResult<()> {
        warn!("Hand save failed ({}), rolling back inserted rows", cause);

        for compensation in compensations.into_iter().rev() {
            let (hand_id, label) = match &compensation {
                Compensation::HandActions(id) => (*id, "hand_actions"),
                Compensation::HandPlayers(id) => (*id, "hand_players"),
                Compensation::Hand(id) => (*id, "hands"),
            };

            let mut result = self.run_compensation(&compensation).await;
            if let Err(e) = &result {
                if e.is_retryable() {
                    warn!("Compensating delete of {} hit {}, retrying once", label, e);
                    result = self.run_compensation(&compensation).await;
                }
            }
            if let Err(e) = result {
                return Err(DbError::RollbackIncomplete {
                    hand_id: hand_id.to_string(),
                    detail: format!("failed to delete {} after {}: {}", label, cause, e),
                });
            }
        }
        Ok(())
    }

    async fn run_compensation(&self, compensation: &Compensation) -> DbResult<()> {
        match compensation {
            Compensation::HandActions(id) => self.store.delete_hand_actions(id).await,
            Compensation::HandPlayers(id) => self.store.delete_hand_players(id).await,
            Compensation::Hand(id) => self.store.delete_hand(id).await,
        }
    }

    /// Save a batch of candidates, continuing past per-hand failures.
    pub async fn persist_batch(
        &self,
        stream_id: &StreamId,
        hands: &[CandidateHand],
    ) -> SaveReport {
        let mut report = SaveReport {
            total: hands.len() as u32,
            ..Default::default()
        };

        for hand in hands {
            match self.persist_hand(stream_id, hand).await {
                Ok(SaveOutcome::SkippedDuplicate) => report.skipped += 1,
                Ok(outcome) => report.saved.push(outcome),
                Err(e) => {
                    warn!("Hand {} failed to save: {}", hand.hand_number, e);
                    report.failed += 1;
                    report.errors.push(format!("hand {}: {}", hand.hand_number, e));
                }
            }
        }

        info!(
            "Batch save: {}/{} hands archived ({} skipped, {} failed)",
            report.saved_count(),
            report.total,
            report.skipped,
            report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, MemoryHandStore};
    use handarc_models::{ActionType, Board, CandidateAction, CandidatePlayer, CandidateWinner, Street};
    use std::sync::Arc;

    fn stream() -> StreamId {
        StreamId::from_string("stream-1")
    }

    fn candidate(hand_number: &str, start: u64) -> CandidateHand {
        CandidateHand {
            hand_number: hand_number.to_string(),
            stakes: Some("500/1000".to_string()),
            pot: 12_000,
            board: Board {
                flop: Some(["As".into(), "Kh".into(), "Qd".into()]),
                turn: None,
                river: None,
            },
            players: vec![
                CandidatePlayer {
                    name: "Phil Ivey".to_string(),
                    position: "BTN".to_string(),
                    seat: Some(1),
                    hole_cards: Some(vec!["Ah".into(), "Ad".into()]),
                    stack_start: 100_000,
                    stack_end: Some(112_000),
                },
                CandidatePlayer {
                    name: "Daniel Negreanu".to_string(),
                    position: "BB".to_string(),
                    seat: Some(2),
                    hole_cards: None,
                    stack_start: 80_000,
                    stack_end: Some(68_000),
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
                    street: Street::Preflop,
                    action: ActionType::Call,
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
                name: "Phil Ivey".to_string(),
                amount: Some(12_000),
                hand_description: Some("Full House, Aces over Kings".to_string()),
            }],
            confidence: Some(0.9),
            timestamp_start: Some(start),
            timestamp_end: Some(start + 120),
        }
    }

    #[tokio::test]
    async fn test_persist_hand_writes_all_tables() {
        let store = Arc::new(MemoryHandStore::new());
        let saver = HandSaver::new(store.clone());

        let outcome = saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap();
        let hand_id = match outcome {
            SaveOutcome::Saved { hand_id, .. } => hand_id,
            other => panic!("expected saved, got {:?}", other),
        };

        let hand = store.get_hand(&hand_id).await.unwrap().unwrap();
        assert_eq!(hand.board, "As Kh Qd");
        assert_eq!(hand.small_blind, Some(500));
        assert_eq!(hand.big_blind, Some(1000));
        assert_eq!(hand.timestamp, "00:01:00 ~ 00:03:00");

        let players = store.hand_players(&hand_id).await.unwrap();
        assert_eq!(players.len(), 2);
        let winner = players.iter().find(|p| p.is_winner).unwrap();
        assert_eq!(winner.amount_won, Some(12_000));
        assert_eq!(winner.hole_cards.as_deref(), Some("Ah Ad"));
        assert_eq!(
            winner.hand_description.as_deref(),
            Some("Full House, Aces over Kings")
        );
        let loser = players.iter().find(|p| !p.is_winner).unwrap();
        assert!(loser.hand_description.is_none());

        let actions = store.hand_actions(&hand_id).await.unwrap();
        assert_eq!(actions.len(), 3);
    }

    #[tokio::test]
    async fn test_player_dedup_across_hands_and_casings() {
        let store = Arc::new(MemoryHandStore::new());
        let saver = HandSaver::new(store.clone());

        saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap();

        let mut second = candidate("2", 300);
        second.players[0].name = "PHIL IVEY".to_string();
        second.actions[0].player = "phil.ivey".to_string();
        saver.persist_hand(&stream(), &second).await.unwrap();

        assert_eq!(store.count_players().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_skipped() {
        let store = Arc::new(MemoryHandStore::new());
        let saver = HandSaver::new(store.clone());

        saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap();
        let outcome = saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap();
        assert_eq!(outcome, SaveOutcome::SkippedDuplicate);
        assert_eq!(store.hand_count(), 1);
    }

    #[tokio::test]
    async fn test_action_failure_rolls_back_whole_hand() {
        let store = Arc::new(MemoryHandStore::new());
        store.fail_once(FailPoint::InsertHandActions);
        let saver = HandSaver::new(store.clone());

        let err = saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap_err();
        assert!(!matches!(err, DbError::RollbackIncomplete { .. }));

        assert_eq!(store.hand_count(), 0);
        assert_eq!(store.action_count(), 0);
        assert!(store
            .hand_players(&HandId::new())
            .await
            .unwrap()
            .is_empty());
        // Player rows are shared and survive the rollback
        assert_eq!(store.count_players().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rollback_retries_transient_delete() {
        let store = Arc::new(MemoryHandStore::new());
        store.fail_once(FailPoint::InsertHandActions);
        store.fail_transient_once(FailPoint::DeleteHandPlayers);
        let saver = HandSaver::new(store.clone());

        let err = saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap_err();
        // Original insert error surfaces, not a rollback failure
        assert!(matches!(err, DbError::Sqlx(_)));
        assert_eq!(store.hand_count(), 0);
    }

    #[tokio::test]
    async fn test_permanent_delete_failure_reports_incomplete_rollback() {
        let store = Arc::new(MemoryHandStore::new());
        store.fail_once(FailPoint::InsertHandActions);
        store.fail_once(FailPoint::DeleteHand);
        let saver = HandSaver::new(store.clone());

        let err = saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap_err();
        assert!(matches!(err, DbError::RollbackIncomplete { .. }));
        // The orphaned hand row is still there for operators to find
        assert_eq!(store.hand_count(), 1);
    }

    #[tokio::test]
    async fn test_sequence_is_global_and_street_ordered() {
        let store = Arc::new(MemoryHandStore::new());
        let saver = HandSaver::new(store.clone());

        let mut hand = candidate("1", 60);
        // Deliver the flop action first
        hand.actions.rotate_right(1);
        let outcome = saver.persist_hand(&stream(), &hand).await.unwrap();
        let hand_id = match outcome {
            SaveOutcome::Saved { hand_id, .. } => hand_id,
            other => panic!("expected saved, got {:?}", other),
        };

        let actions = store.hand_actions(&hand_id).await.unwrap();
        let sequences: Vec<i32> = actions.iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(actions[0].street, "preflop");
        assert_eq!(actions[2].street, "flop");
    }

    #[tokio::test]
    async fn test_batch_continues_past_invalid_hand() {
        let store = Arc::new(MemoryHandStore::new());
        let saver = HandSaver::new(store.clone());

        let mut bad = candidate("2", 300);
        bad.players.clear();
        let hands = vec![candidate("1", 60), bad, candidate("3", 600)];

        let report = saver.persist_batch(&stream(), &hands).await;
        assert_eq!(report.total, 3);
        assert_eq!(report.saved_count(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("hand 2"));
        assert!((report.success_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_resolve_player_rereads_after_lost_race() {
        let store = Arc::new(MemoryHandStore::new());
        // Another writer created the row between our find and insert
        store.insert_player("Phil Ivey", "philivey").await.unwrap();
        let saver = HandSaver::new(store.clone());

        saver.persist_hand(&stream(), &candidate("1", 60)).await.unwrap();
        assert_eq!(store.count_players().await.unwrap(), 2);
    }
}
