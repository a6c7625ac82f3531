use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::{AppState, models::AuthenticatedUser};

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

// Axum extractor for authenticated players
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| {
                (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response()
            })?;

        let Some(token) = auth_header.strip_prefix("Bearer ") else {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header format",
            )
                .into_response());
        };

        match state.storage.get_session(token) {
            Some(session) => Ok(AuthUser(AuthenticatedUser::from(session))),
            None => {
                tracing::warn!("rejected unknown session token");
                Err((StatusCode::UNAUTHORIZED, "Invalid token").into_response())
            }
        }
    }
}

// Operator routes: the request must carry the configured admin secret
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_secret.as_deref() else {
            return Err((StatusCode::FORBIDDEN, "Admin API disabled").into_response());
        };

        let provided = parts
            .headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| {
                (StatusCode::UNAUTHORIZED, "Missing x-admin-secret header").into_response()
            })?;

        if secrets_match(provided, expected) {
            Ok(AdminAuth)
        } else {
            tracing::warn!("rejected admin request with wrong secret");
            Err((StatusCode::UNAUTHORIZED, "Invalid admin secret").into_response())
        }
    }
}

// Compare digests so the check does not short-circuit on the first differing byte
fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
