//! Postgres implementation of [`HandStore`].
//!
//! Queries are bound at runtime (`query_as` with `$n` placeholders), with
//! per-table column list constants so SELECT and RETURNING stay in sync
//! with the row structs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use handarc_models::{
    AnalysisJob, Hand, HandAction, HandId, HandPlayer, JobId, JobStatus, Player, PlayerId,
    StreamId, StreamStatus, VideoSegment,
};

use crate::error::{DbError, DbResult};
use crate::store::{HandStore, NewHand, NewHandAction, NewHandPlayer};

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?)
}

const PLAYER_COLUMNS: &str = "id, name, normalized_name, country, total_winnings, created_at";

const HAND_COLUMNS: &str = "id, stream_id, hand_number, timestamp, description, \
    small_blind, big_blind, ante, pot_size, board, confidence, created_at";

const HAND_PLAYER_COLUMNS: &str = "hand_id, player_id, position, seat, hole_cards, \
    stack_start, stack_end, is_winner, amount_won, hand_description";

const HAND_ACTION_COLUMNS: &str = "hand_id, player_id, street, action_type, amount, sequence";

const JOB_COLUMNS: &str = "id, stream_id, segment_start, segment_end, segment_label, \
    status, error, saved_hands, created_at, updated_at";

#[derive(FromRow)]
struct PlayerRow {
    id: Uuid,
    name: String,
    normalized_name: String,
    country: Option<String>,
    total_winnings: i64,
    created_at: DateTime<Utc>,
}

impl From<PlayerRow> for Player {
    fn from(r: PlayerRow) -> Self {
        Player {
            id: PlayerId(r.id),
            name: r.name,
            normalized_name: r.normalized_name,
            country: r.country,
            total_winnings: r.total_winnings,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct HandRow {
    id: Uuid,
    stream_id: String,
    hand_number: String,
    timestamp: String,
    description: Option<String>,
    small_blind: Option<i64>,
    big_blind: Option<i64>,
    ante: Option<i64>,
    pot_size: i64,
    board: String,
    confidence: Option<f64>,
    created_at: DateTime<Utc>,
}

impl From<HandRow> for Hand {
    fn from(r: HandRow) -> Self {
        Hand {
            id: HandId(r.id),
            stream_id: StreamId(r.stream_id),
            hand_number: r.hand_number,
            timestamp: r.timestamp,
            description: r.description,
            small_blind: r.small_blind,
            big_blind: r.big_blind,
            ante: r.ante,
            pot_size: r.pot_size,
            board: r.board,
            confidence: r.confidence,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct HandPlayerRow {
    hand_id: Uuid,
    player_id: Uuid,
    position: String,
    seat: Option<i16>,
    hole_cards: Option<String>,
    stack_start: i64,
    stack_end: Option<i64>,
    is_winner: bool,
    amount_won: Option<i64>,
    hand_description: Option<String>,
}

impl From<HandPlayerRow> for HandPlayer {
    fn from(r: HandPlayerRow) -> Self {
        HandPlayer {
            hand_id: HandId(r.hand_id),
            player_id: PlayerId(r.player_id),
            position: r.position,
            seat: r.seat,
            hole_cards: r.hole_cards,
            stack_start: r.stack_start,
            stack_end: r.stack_end,
            is_winner: r.is_winner,
            amount_won: r.amount_won,
            hand_description: r.hand_description,
        }
    }
}

#[derive(FromRow)]
struct HandActionRow {
    hand_id: Uuid,
    player_id: Uuid,
    street: String,
    action_type: String,
    amount: Option<i64>,
    sequence: i32,
}

impl From<HandActionRow> for HandAction {
    fn from(r: HandActionRow) -> Self {
        HandAction {
            hand_id: HandId(r.hand_id),
            player_id: PlayerId(r.player_id),
            street: r.street,
            action_type: r.action_type,
            amount: r.amount,
            sequence: r.sequence,
        }
    }
}

#[derive(FromRow)]
struct JobRow {
    id: String,
    stream_id: String,
    segment_start: f64,
    segment_end: f64,
    segment_label: Option<String>,
    status: String,
    error: Option<String>,
    saved_hands: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for AnalysisJob {
    type Error = DbError;

    fn try_from(r: JobRow) -> Result<Self, DbError> {
        let status = match r.status.as_str() {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            other => return Err(DbError::not_found("job status", other)),
        };
        Ok(AnalysisJob {
            id: JobId(r.id),
            stream_id: StreamId(r.stream_id),
            segment: VideoSegment {
                start: r.segment_start,
                end: r.segment_end,
                label: r.segment_label,
            },
            status,
            error: r.error,
            saved_hands: r.saved_hands,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Postgres-backed hand store.
#[derive(Clone)]
pub struct PgHandStore {
    pool: PgPool,
}

impl PgHandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from the crate's migrations directory.
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HandStore for PgHandStore {
    async fn find_player_by_normalized_name(&self, normalized: &str) -> DbResult<Option<Player>> {
        let query = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE normalized_name = $1");
        let row = sqlx::query_as::<_, PlayerRow>(&query)
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Player::from))
    }

    async fn insert_player(&self, name: &str, normalized: &str) -> DbResult<Player> {
        let query = format!(
            "INSERT INTO players (id, name, normalized_name)
             VALUES ($1, $2, $3)
             RETURNING {PLAYER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PlayerRow>(&query)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(normalized)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn count_players(&self) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn hand_exists(&self, stream_id: &StreamId, timestamp: &str) -> DbResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM hands WHERE stream_id = $1 AND timestamp = $2)",
        )
        .bind(stream_id.as_str())
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_hand(&self, hand: &NewHand) -> DbResult<Hand> {
        let query = format!(
            "INSERT INTO hands
                (id, stream_id, hand_number, timestamp, description,
                 small_blind, big_blind, ante, pot_size, board, confidence)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {HAND_COLUMNS}"
        );
        let row = sqlx::query_as::<_, HandRow>(&query)
            .bind(Uuid::new_v4())
            .bind(hand.stream_id.as_str())
            .bind(&hand.hand_number)
            .bind(&hand.timestamp)
            .bind(&hand.description)
            .bind(hand.small_blind)
            .bind(hand.big_blind)
            .bind(hand.ante)
            .bind(hand.pot_size)
            .bind(&hand.board)
            .bind(hand.confidence)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_hand(&self, id: &HandId) -> DbResult<Option<Hand>> {
        let query = format!("SELECT {HAND_COLUMNS} FROM hands WHERE id = $1");
        let row = sqlx::query_as::<_, HandRow>(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Hand::from))
    }

    async fn list_hands(&self, stream_id: &StreamId) -> DbResult<Vec<Hand>> {
        let query = format!(
            "SELECT {HAND_COLUMNS} FROM hands WHERE stream_id = $1 ORDER BY timestamp ASC"
        );
        let rows = sqlx::query_as::<_, HandRow>(&query)
            .bind(stream_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Hand::from).collect())
    }

    async fn delete_hand(&self, id: &HandId) -> DbResult<()> {
        sqlx::query("DELETE FROM hands WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_hand_players(&self, rows: &[NewHandPlayer]) -> DbResult<()> {
        for row in rows {
            sqlx::query(
                "INSERT INTO hand_players
                    (hand_id, player_id, position, seat, hole_cards,
                     stack_start, stack_end, is_winner, amount_won, hand_description)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(row.hand_id.0)
            .bind(row.player_id.0)
            .bind(&row.position)
            .bind(row.seat)
            .bind(&row.hole_cards)
            .bind(row.stack_start)
            .bind(row.stack_end)
            .bind(row.is_winner)
            .bind(row.amount_won)
            .bind(&row.hand_description)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn hand_players(&self, hand_id: &HandId) -> DbResult<Vec<HandPlayer>> {
        let query = format!(
            "SELECT {HAND_PLAYER_COLUMNS} FROM hand_players WHERE hand_id = $1 ORDER BY seat"
        );
        let rows = sqlx::query_as::<_, HandPlayerRow>(&query)
            .bind(hand_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HandPlayer::from).collect())
    }

    async fn delete_hand_players(&self, hand_id: &HandId) -> DbResult<()> {
        sqlx::query("DELETE FROM hand_players WHERE hand_id = $1")
            .bind(hand_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_hand_actions(&self, rows: &[NewHandAction]) -> DbResult<()> {
        for row in rows {
            sqlx::query(
                "INSERT INTO hand_actions
                    (hand_id, player_id, street, action_type, amount, sequence)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(row.hand_id.0)
            .bind(row.player_id.0)
            .bind(&row.street)
            .bind(&row.action_type)
            .bind(row.amount)
            .bind(row.sequence)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn hand_actions(&self, hand_id: &HandId) -> DbResult<Vec<HandAction>> {
        let query = format!(
            "SELECT {HAND_ACTION_COLUMNS} FROM hand_actions WHERE hand_id = $1 ORDER BY sequence"
        );
        let rows = sqlx::query_as::<_, HandActionRow>(&query)
            .bind(hand_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HandAction::from).collect())
    }

    async fn delete_hand_actions(&self, hand_id: &HandId) -> DbResult<()> {
        sqlx::query("DELETE FROM hand_actions WHERE hand_id = $1")
            .bind(hand_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_stream(&self, stream_id: &StreamId, url: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO streams (id, url, status) VALUES ($1, $2, 'analyzing')
             ON CONFLICT (id) DO UPDATE SET status = 'analyzing', updated_at = NOW()",
        )
        .bind(stream_id.as_str())
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_stream_status(
        &self,
        stream_id: &StreamId,
        status: StreamStatus,
    ) -> DbResult<()> {
        sqlx::query("UPDATE streams SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(stream_id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_job(&self, job: &AnalysisJob) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO analysis_jobs
                (id, stream_id, segment_start, segment_end, segment_label,
                 status, error, saved_hands, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(job.id.as_str())
        .bind(job.stream_id.as_str())
        .bind(job.segment.start)
        .bind(job.segment.end)
        .bind(&job.segment.label)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(job.saved_hands)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> DbResult<Option<AnalysisJob>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(AnalysisJob::try_from).transpose()
    }

    async fn update_job(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
        saved_hands: Option<i64>,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE analysis_jobs
             SET status = $2,
                 error = COALESCE($3, error),
                 saved_hands = COALESCE($4, saved_hands),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(error)
        .bind(saved_hands)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
