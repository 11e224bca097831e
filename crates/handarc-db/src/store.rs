//! The row-level store abstraction.

use std::sync::Arc;

use async_trait::async_trait;

use handarc_models::{
    AnalysisJob, Hand, HandAction, HandId, HandPlayer, JobId, JobStatus, Player, StreamId,
    StreamStatus,
};

use crate::error::DbResult;

/// Insert payload for a hand row. The id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewHand {
    pub stream_id: StreamId,
    pub hand_number: String,
    pub timestamp: String,
    pub description: Option<String>,
    pub small_blind: Option<i64>,
    pub big_blind: Option<i64>,
    pub ante: Option<i64>,
    pub pot_size: i64,
    pub board: String,
    pub confidence: Option<f64>,
}

/// Insert payload for a hand participation row.
#[derive(Debug, Clone)]
pub struct NewHandPlayer {
    pub hand_id: HandId,
    pub player_id: handarc_models::PlayerId,
    pub position: String,
    pub seat: Option<i16>,
    pub hole_cards: Option<String>,
    pub stack_start: i64,
    pub stack_end: Option<i64>,
    pub is_winner: bool,
    pub amount_won: Option<i64>,
    pub hand_description: Option<String>,
}

/// Insert payload for an action row.
#[derive(Debug, Clone)]
pub struct NewHandAction {
    pub hand_id: HandId,
    pub player_id: handarc_models::PlayerId,
    pub street: String,
    pub action_type: String,
    pub amount: Option<i64>,
    pub sequence: i32,
}

/// Row-level operations over the archive schema.
///
/// Methods are deliberately single-purpose so the save protocol in
/// [`crate::saver`] can compensate each insert individually when a later
/// step fails.
#[async_trait]
pub trait HandStore: Send + Sync {
    // Players
    async fn find_player_by_normalized_name(&self, normalized: &str) -> DbResult<Option<Player>>;
    async fn insert_player(&self, name: &str, normalized: &str) -> DbResult<Player>;
    async fn count_players(&self) -> DbResult<i64>;

    // Hands
    async fn hand_exists(&self, stream_id: &StreamId, timestamp: &str) -> DbResult<bool>;
    async fn insert_hand(&self, hand: &NewHand) -> DbResult<Hand>;
    async fn get_hand(&self, id: &HandId) -> DbResult<Option<Hand>>;
    async fn list_hands(&self, stream_id: &StreamId) -> DbResult<Vec<Hand>>;
    async fn delete_hand(&self, id: &HandId) -> DbResult<()>;

    // Hand players
    async fn insert_hand_players(&self, rows: &[NewHandPlayer]) -> DbResult<()>;
    async fn hand_players(&self, hand_id: &HandId) -> DbResult<Vec<HandPlayer>>;
    async fn delete_hand_players(&self, hand_id: &HandId) -> DbResult<()>;

    // Hand actions
    async fn insert_hand_actions(&self, rows: &[NewHandAction]) -> DbResult<()>;
    async fn hand_actions(&self, hand_id: &HandId) -> DbResult<Vec<HandAction>>;
    async fn delete_hand_actions(&self, hand_id: &HandId) -> DbResult<()>;

    // Streams
    /// Create the stream row if it does not exist yet, resetting its status
    /// to `analyzing` either way. Hands and jobs reference the stream row,
    /// so runs call this before any other write.
    async fn ensure_stream(&self, stream_id: &StreamId, url: &str) -> DbResult<()>;
    async fn update_stream_status(
        &self,
        stream_id: &StreamId,
        status: StreamStatus,
    ) -> DbResult<()>;

    // Analysis jobs
    async fn insert_job(&self, job: &AnalysisJob) -> DbResult<()>;
    async fn get_job(&self, id: &JobId) -> DbResult<Option<AnalysisJob>>;
    async fn update_job(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        saved_hands: Option<i64>,
    ) -> DbResult<()>;
}

/// Stores are shared as `Arc<dyn HandStore>` across spawned tasks; this
/// lets the saver and pipeline take `impl HandStore` either way.
#[async_trait]
impl<T: HandStore + ?Sized> HandStore for Arc<T> {
    async fn find_player_by_normalized_name(&self, normalized: &str) -> DbResult<Option<Player>> {
        (**self).find_player_by_normalized_name(normalized).await
    }
    async fn insert_player(&self, name: &str, normalized: &str) -> DbResult<Player> {
        (**self).insert_player(name, normalized).await
    }
    async fn count_players(&self) -> DbResult<i64> {
        (**self).count_players().await
    }
    async fn hand_exists(&self, stream_id: &StreamId, timestamp: &str) -> DbResult<bool> {
        (**self).hand_exists(stream_id, timestamp).await
    }
    async fn insert_hand(&self, hand: &NewHand) -> DbResult<Hand> {
        (**self).insert_hand(hand).await
    }
    async fn get_hand(&self, id: &HandId) -> DbResult<Option<Hand>> {
        (**self).get_hand(id).await
    }
    async fn list_hands(&self, stream_id: &StreamId) -> DbResult<Vec<Hand>> {
        (**self).list_hands(stream_id).await
    }
    async fn delete_hand(&self, id: &HandId) -> DbResult<()> {
        (**self).delete_hand(id).await
    }
    async fn insert_hand_players(&self, rows: &[NewHandPlayer]) -> DbResult<()> {
        (**self).insert_hand_players(rows).await
    }
    async fn hand_players(&self, hand_id: &HandId) -> DbResult<Vec<HandPlayer>> {
        (**self).hand_players(hand_id).await
    }
    async fn delete_hand_players(&self, hand_id: &HandId) -> DbResult<()> {
        (**self).delete_hand_players(hand_id).await
    }
    async fn insert_hand_actions(&self, rows: &[NewHandAction]) -> DbResult<()> {
        (**self).insert_hand_actions(rows).await
    }
    async fn hand_actions(&self, hand_id: &HandId) -> DbResult<Vec<HandAction>> {
        (**self).hand_actions(hand_id).await
    }
    async fn delete_hand_actions(&self, hand_id: &HandId) -> DbResult<()> {
        (**self).delete_hand_actions(hand_id).await
    }
    async fn ensure_stream(&self, stream_id: &StreamId, url: &str) -> DbResult<()> {
        (**self).ensure_stream(stream_id, url).await
    }
    async fn update_stream_status(
        &self,
        stream_id: &StreamId,
        status: StreamStatus,
    ) -> DbResult<()> {
        (**self).update_stream_status(stream_id, status).await
    }
    async fn insert_job(&self, job: &AnalysisJob) -> DbResult<()> {
        (**self).insert_job(job).await
    }
    async fn get_job(&self, id: &JobId) -> DbResult<Option<AnalysisJob>> {
        (**self).get_job(id).await
    }
    async fn update_job(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        saved_hands: Option<i64>,
    ) -> DbResult<()> {
        (**self).update_job(id, status, error, saved_hands).await
    }
}
