use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use engine::{CatalogError, EngineError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => match err {
                EngineError::InvalidWager { .. } | EngineError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                EngineError::NotFound { .. } | EngineError::InvalidToken => StatusCode::NOT_FOUND,
                EngineError::Conflict { .. }
                | EngineError::AlreadyClaimed { .. }
                | EngineError::AlreadyRedeemed { .. } => StatusCode::CONFLICT,
                EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                EngineError::InsufficientEnergy { .. }
                | EngineError::InsufficientCoins { .. }
                | EngineError::NoTokens
                | EngineError::NoPackTokens
                | EngineError::Exhausted
                | EngineError::InsufficientDuplicates { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Catalog(CatalogError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Catalog(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Engine(err) => err.kind(),
            ApiError::Catalog(CatalogError::Io(_)) => "catalog_unavailable",
            ApiError::Catalog(_) => "invalid_catalog",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "request failed: {}", self);
        } else {
            tracing::debug!(kind = self.kind(), "request rejected: {}", self);
        }

        let body = ErrorBody {
            success: false,
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
