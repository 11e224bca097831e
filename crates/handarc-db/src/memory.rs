//! In-memory [`HandStore`] for tests.
//!
//! Emulates the schema's unique constraints and supports scheduled failure
//! injection at each operation, which is how the save protocol's rollback
//! behavior is exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use handarc_models::{
    AnalysisJob, Hand, HandAction, HandId, HandPlayer, JobId, JobStatus, Player, PlayerId,
    StreamId, StreamStatus,
};

use crate::error::{DbError, DbResult};
use crate::store::{HandStore, NewHand, NewHandAction, NewHandPlayer};

/// Operations where a failure can be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FindPlayer,
    InsertPlayer,
    InsertHand,
    InsertHandPlayers,
    InsertHandActions,
    DeleteHand,
    DeleteHandPlayers,
    DeleteHandActions,
    UpdateStream,
}

#[derive(Debug, Clone, Copy)]
enum FailMode {
    /// Permanent failure (protocol error, not retryable).
    Fatal,
    /// Transient failure (pool timeout, retryable).
    Transient,
}

impl FailMode {
    fn to_error(self) -> DbError {
        match self {
            FailMode::Fatal => DbError::Sqlx(sqlx::Error::Protocol("injected failure".into())),
            FailMode::Transient => DbError::Sqlx(sqlx::Error::PoolTimedOut),
        }
    }
}

#[derive(Default)]
struct State {
    players: Vec<Player>,
    hands: Vec<Hand>,
    hand_players: Vec<HandPlayer>,
    hand_actions: Vec<HandAction>,
    jobs: HashMap<String, AnalysisJob>,
    stream_statuses: HashMap<String, StreamStatus>,
    fail_points: HashMap<FailPoint, Vec<FailMode>>,
}

/// In-memory hand store.
#[derive(Default)]
pub struct MemoryHandStore {
    state: Mutex<State>,
}

impl MemoryHandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the next call at `point` to fail permanently.
    pub fn fail_once(&self, point: FailPoint) {
        self.schedule(point, FailMode::Fatal);
    }

    /// Schedule the next call at `point` to fail with a retryable error.
    pub fn fail_transient_once(&self, point: FailPoint) {
        self.schedule(point, FailMode::Transient);
    }

    fn schedule(&self, point: FailPoint, mode: FailMode) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_points.entry(point).or_default().push(mode);
        }
    }

    fn maybe_fail(state: &mut State, point: FailPoint) -> DbResult<()> {
        if let Some(modes) = state.fail_points.get_mut(&point) {
            if let Some(mode) = modes.pop() {
                return Err(mode.to_error());
            }
        }
        Ok(())
    }

    /// Stream status last written, for assertions.
    pub fn stream_status(&self, stream_id: &StreamId) -> Option<StreamStatus> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.stream_statuses.get(stream_id.as_str()).copied())
    }

    /// Total action rows, for assertions.
    pub fn action_count(&self) -> usize {
        self.state.lock().map(|s| s.hand_actions.len()).unwrap_or(0)
    }

    /// Total hand rows, for assertions.
    pub fn hand_count(&self) -> usize {
        self.state.lock().map(|s| s.hands.len()).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Lock poisoning only happens if a test panicked mid-operation
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HandStore for MemoryHandStore {
    async fn find_player_by_normalized_name(&self, normalized: &str) -> DbResult<Option<Player>> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::FindPlayer)?;
        Ok(state
            .players
            .iter()
            .find(|p| p.normalized_name == normalized)
            .cloned())
    }

    async fn insert_player(&self, name: &str, normalized: &str) -> DbResult<Player> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::InsertPlayer)?;
        if state.players.iter().any(|p| p.normalized_name == normalized) {
            return Err(DbError::UniqueViolation {
                constraint: "players_normalized_name_key".to_string(),
            });
        }
        let player = Player {
            id: PlayerId(Uuid::new_v4()),
            name: name.to_string(),
            normalized_name: normalized.to_string(),
            country: None,
            total_winnings: 0,
            created_at: Utc::now(),
        };
        state.players.push(player.clone());
        Ok(player)
    }

    async fn count_players(&self) -> DbResult<i64> {
        Ok(self.lock().players.len() as i64)
    }

    async fn hand_exists(&self, stream_id: &StreamId, timestamp: &str) -> DbResult<bool> {
        let state = self.lock();
        Ok(state
            .hands
            .iter()
            .any(|h| h.stream_id == *stream_id && h.timestamp == timestamp))
    }

    async fn insert_hand(&self, hand: &NewHand) -> DbResult<Hand> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::InsertHand)?;
        if state
            .hands
            .iter()
            .any(|h| h.stream_id == hand.stream_id && h.timestamp == hand.timestamp)
        {
            return Err(DbError::UniqueViolation {
                constraint: "hands_stream_id_timestamp_key".to_string(),
            });
        }
        let row = Hand {
            id: HandId::new(),
            stream_id: hand.stream_id.clone(),
            hand_number: hand.hand_number.clone(),
            timestamp: hand.timestamp.clone(),
            description: hand.description.clone(),
            small_blind: hand.small_blind,
            big_blind: hand.big_blind,
            ante: hand.ante,
            pot_size: hand.pot_size,
            board: hand.board.clone(),
            confidence: hand.confidence,
            created_at: Utc::now(),
        };
        state.hands.push(row.clone());
        Ok(row)
    }

    async fn get_hand(&self, id: &HandId) -> DbResult<Option<Hand>> {
        Ok(self.lock().hands.iter().find(|h| h.id == *id).cloned())
    }

    async fn list_hands(&self, stream_id: &StreamId) -> DbResult<Vec<Hand>> {
        let mut hands: Vec<Hand> = self
            .lock()
            .hands
            .iter()
            .filter(|h| h.stream_id == *stream_id)
            .cloned()
            .collect();
        hands.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(hands)
    }

    async fn delete_hand(&self, id: &HandId) -> DbResult<()> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::DeleteHand)?;
        state.hands.retain(|h| h.id != *id);
        Ok(())
    }

    async fn insert_hand_players(&self, rows: &[NewHandPlayer]) -> DbResult<()> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::InsertHandPlayers)?;
        for row in rows {
            if state
                .hand_players
                .iter()
                .any(|p| p.hand_id == row.hand_id && p.player_id == row.player_id)
            {
                return Err(DbError::UniqueViolation {
                    constraint: "hand_players_hand_id_player_id_key".to_string(),
                });
            }
            state.hand_players.push(HandPlayer {
                hand_id: row.hand_id,
                player_id: row.player_id,
                position: row.position.clone(),
                seat: row.seat,
                hole_cards: row.hole_cards.clone(),
                stack_start: row.stack_start,
                stack_end: row.stack_end,
                is_winner: row.is_winner,
                amount_won: row.amount_won,
                hand_description: row.hand_description.clone(),
            });
        }
        Ok(())
    }

    async fn hand_players(&self, hand_id: &HandId) -> DbResult<Vec<HandPlayer>> {
        Ok(self
            .lock()
            .hand_players
            .iter()
            .filter(|p| p.hand_id == *hand_id)
            .cloned()
            .collect())
    }

    async fn delete_hand_players(&self, hand_id: &HandId) -> DbResult<()> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::DeleteHandPlayers)?;
        state.hand_players.retain(|p| p.hand_id != *hand_id);
        Ok(())
    }

    async fn insert_hand_actions(&self, rows: &[NewHandAction]) -> DbResult<()> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::InsertHandActions)?;
        for row in rows {
            if state
                .hand_actions
                .iter()
                .any(|a| a.hand_id == row.hand_id && a.sequence == row.sequence)
            {
                return Err(DbError::UniqueViolation {
                    constraint: "hand_actions_hand_id_sequence_key".to_string(),
                });
            }
            state.hand_actions.push(HandAction {
                hand_id: row.hand_id,
                player_id: row.player_id,
                street: row.street.clone(),
                action_type: row.action_type.clone(),
                amount: row.amount,
                sequence: row.sequence,
            });
        }
        Ok(())
    }

    async fn hand_actions(&self, hand_id: &HandId) -> DbResult<Vec<HandAction>> {
        let mut actions: Vec<HandAction> = self
            .lock()
            .hand_actions
            .iter()
            .filter(|a| a.hand_id == *hand_id)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.sequence);
        Ok(actions)
    }

    async fn delete_hand_actions(&self, hand_id: &HandId) -> DbResult<()> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::DeleteHandActions)?;
        state.hand_actions.retain(|a| a.hand_id != *hand_id);
        Ok(())
    }

    async fn ensure_stream(&self, stream_id: &StreamId, _url: &str) -> DbResult<()> {
        let mut state = self.lock();
        state
            .stream_statuses
            .insert(stream_id.as_str().to_string(), StreamStatus::Analyzing);
        Ok(())
    }

    async fn update_stream_status(
        &self,
        stream_id: &StreamId,
        status: StreamStatus,
    ) -> DbResult<()> {
        let mut state = self.lock();
        Self::maybe_fail(&mut state, FailPoint::UpdateStream)?;
        state
            .stream_statuses
            .insert(stream_id.as_str().to_string(), status);
        Ok(())
    }

    async fn insert_job(&self, job: &AnalysisJob) -> DbResult<()> {
        let mut state = self.lock();
        state.jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> DbResult<Option<AnalysisJob>> {
        Ok(self.lock().jobs.get(id.as_str()).cloned())
    }

    async fn update_job(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        saved_hands: Option<i64>,
    ) -> DbResult<()> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(id.as_str())
            .ok_or_else(|| DbError::not_found("job", id.as_str()))?;
        job.status = status;
        if let Some(error) = error {
            job.error = Some(error.to_string());
        }
        if let Some(saved) = saved_hands {
            job.saved_hands = Some(saved);
        }
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_player_unique_constraint() {
        let store = MemoryHandStore::new();
        store.insert_player("Phil Ivey", "philivey").await.unwrap();
        let err = store.insert_player("PHIL IVEY", "philivey").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(store.count_players().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fail_once_fires_exactly_once() {
        let store = MemoryHandStore::new();
        store.fail_once(FailPoint::InsertPlayer);
        assert!(store.insert_player("A", "a").await.is_err());
        assert!(store.insert_player("A", "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_transient_injection_is_retryable() {
        let store = MemoryHandStore::new();
        store.fail_transient_once(FailPoint::DeleteHandActions);
        let err = store.delete_hand_actions(&HandId::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
