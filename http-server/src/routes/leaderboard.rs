use axum::{
    Json,
    extract::{Query, State},
};
use engine::leaderboard::{LeaderboardEntry, Standing};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError, middleware::AuthUser};

const MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub me: Standing,
}

// Weekly board plus the caller's own rank, which may sit below the cut
pub async fn get_leaderboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let limit = query.limit.map(|limit| limit.min(MAX_LIMIT));
    let entries = state.engine.top_n(limit)?;
    let me = state.engine.standing(user.user_id)?;
    Ok(Json(LeaderboardResponse { entries, me }))
}
