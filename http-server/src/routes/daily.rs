use axum::{Json, extract::State};
use engine::daily::{DailyClaim, DailyStatus};

use crate::{AppState, error::ApiError, middleware::AuthUser};

pub async fn get_daily(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<DailyStatus>, ApiError> {
    Ok(Json(state.engine.peek_daily(user.user_id)?))
}

pub async fn claim_daily(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<DailyClaim>, ApiError> {
    Ok(Json(state.engine.claim_daily(user.user_id)?))
}
