//! Read endpoints over archived hands.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use handarc_models::{Hand, HandAction, HandId, HandPlayer, StreamId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// List the hands archived for one stream, in insertion order.
pub async fn list_stream_hands(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> ApiResult<Json<Vec<Hand>>> {
    let hands = state
        .store
        .list_hands(&StreamId::from_string(stream_id))
        .await?;
    Ok(Json(hands))
}

/// A hand with its participants and action sequence.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandDetail {
    #[serde(flatten)]
    pub hand: Hand,
    pub players: Vec<HandPlayer>,
    pub actions: Vec<HandAction>,
}

/// Fetch one hand with players and actions.
pub async fn get_hand(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<HandDetail>> {
    let hand_id = HandId(id);
    let hand = state
        .store
        .get_hand(&hand_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("hand {} not found", hand_id)))?;

    let players = state.store.hand_players(&hand_id).await?;
    let actions = state.store.hand_actions(&hand_id).await?;

    Ok(Json(HandDetail {
        hand,
        players,
        actions,
    }))
}
