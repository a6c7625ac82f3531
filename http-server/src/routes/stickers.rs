use axum::{Json, extract::State};
use engine::album::{PackOpening, PackPayment, StickerOverview, TradeOutcome, TradeReward};
use engine::types::AlbumId;
use serde::Deserialize;

use crate::{
    AppState,
    error::ApiError,
    middleware::AuthUser,
    websocket::{NotificationType, send_notification_to_user},
};

pub async fn get_stickers(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<StickerOverview>, ApiError> {
    Ok(Json(state.engine.albums(user.user_id)?))
}

#[derive(Deserialize)]
pub struct OpenPackRequest {
    pub album_id: AlbumId,
    #[serde(default)]
    pub payment: PackPayment,
}

pub async fn open_pack(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<OpenPackRequest>,
) -> Result<Json<PackOpening>, ApiError> {
    let opening = state
        .engine
        .open_pack(user.user_id, payload.album_id, payload.payment)?;
    if opening.album_completed_now {
        send_notification_to_user(
            &state.notification_manager,
            user.user_id,
            NotificationType::AlbumCompleted {
                album_id: opening.album_id,
                reward: opening.completion_reward,
            },
        );
    }
    Ok(Json(opening))
}

#[derive(Deserialize)]
pub struct TradeRequest {
    pub reward_type: TradeReward,
    #[serde(default = "one_set")]
    pub sets: u64,
}

fn one_set() -> u64 {
    1
}

pub async fn trade_duplicates(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<TradeRequest>,
) -> Result<Json<TradeOutcome>, ApiError> {
    Ok(Json(state.engine.trade_duplicates(
        user.user_id,
        payload.reward_type,
        payload.sets,
    )?))
}
