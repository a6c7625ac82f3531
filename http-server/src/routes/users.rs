use axum::{Json, extract::State};
use engine::Profile;
use engine::leaderboard::Standing;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    error::ApiError,
    middleware::AuthUser,
    models::AuthenticatedUser,
};

// Login request: the host platform's player id, plus an optional display name
#[derive(Deserialize)]
pub struct AuthRequest {
    pub external_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub created: bool,
    pub user: AuthenticatedUser,
    pub profile: Profile,
}

// Register-or-login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let external_id = payload.external_id.trim();
    let username = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let registration = state.engine.register(external_id, username)?;
    let session = state.storage.open_session(
        &state.config.session_secret,
        registration.user_id,
        external_id,
        username,
    );
    let profile = state.engine.profile(registration.user_id)?;

    Ok(Json(AuthResponse {
        success: true,
        message: if registration.created {
            "Welcome aboard".to_string()
        } else {
            "Login successful".to_string()
        },
        session_id: session.session_id.clone(),
        created: registration.created,
        user: AuthenticatedUser::from(session),
        profile,
    }))
}

#[derive(Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: AuthenticatedUser,
    pub profile: Profile,
    pub standing: Standing,
}

// Current player's profile (protected route)
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let profile = state.engine.profile(user.user_id)?;
    let standing = state.engine.standing(user.user_id)?;
    Ok(Json(MeResponse {
        success: true,
        user,
        profile,
        standing,
    }))
}
