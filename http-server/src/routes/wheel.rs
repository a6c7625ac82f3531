use axum::{Json, extract::State};
use engine::wheel::{WheelOutcome, WheelReward};
use serde::Serialize;

use crate::{
    AppState, error::ApiError, middleware::AuthUser, websocket::send_progress_notifications,
};

#[derive(Serialize)]
pub struct WheelResponse {
    pub rewards: Vec<WheelReward>,
    pub tokens: u64,
}

// Active prizes plus how many spins the player can afford
pub async fn get_wheel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<WheelResponse>, ApiError> {
    let rewards = state.engine.wheel_rewards()?;
    let tokens = state.engine.profile(user.user_id)?.balances.wheel_tokens;
    Ok(Json(WheelResponse { rewards, tokens }))
}

pub async fn spin_wheel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<WheelOutcome>, ApiError> {
    let outcome = state.engine.spin_wheel(user.user_id)?;
    send_progress_notifications(
        &state.notification_manager,
        user.user_id,
        &outcome.level_ups,
        &outcome.events_completed,
    );
    Ok(Json(outcome))
}
