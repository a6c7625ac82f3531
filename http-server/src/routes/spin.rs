use axum::{Json, extract::State};
use engine::spin::SpinOutcome;
use serde::Deserialize;

use crate::{
    AppState, error::ApiError, middleware::AuthUser, websocket::send_progress_notifications,
};

#[derive(Deserialize)]
pub struct SpinRequest {
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,
}

fn default_multiplier() -> u64 {
    1
}

pub async fn spin(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<SpinRequest>,
) -> Result<Json<SpinOutcome>, ApiError> {
    let outcome = state.engine.spin(user.user_id, payload.multiplier)?;
    send_progress_notifications(
        &state.notification_manager,
        user.user_id,
        &outcome.level_ups,
        &outcome.events_completed,
    );
    Ok(Json(outcome))
}
