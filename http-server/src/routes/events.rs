use axum::{Json, extract::State};
use engine::events::EventView;

use crate::{AppState, error::ApiError, middleware::AuthUser};

pub async fn get_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<EventView>>, ApiError> {
    Ok(Json(state.engine.events(user.user_id)?))
}
