use axum::{
    Json,
    extract::{Path, State},
};
use engine::links::LinkRedemption;

use crate::{AppState, error::ApiError, middleware::AuthUser};

pub async fn redeem(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(token): Path<String>,
) -> Result<Json<LinkRedemption>, ApiError> {
    Ok(Json(state.engine.redeem(user.user_id, token.trim())?))
}
