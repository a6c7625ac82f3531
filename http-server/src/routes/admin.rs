use axum::{
    Json,
    extract::{Path, State},
};
use engine::links::{NewLink, RewardLink};
use engine::rewards::TopRewardReport;
use engine::shop::PurchaseReceipt;
use engine::{Catalog, CompiledCatalog, EngineError, RewardGrant};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    error::ApiError,
    middleware::AdminAuth,
    models::BroadcastRecord,
    websocket::{NotificationType, broadcast_to_all},
};

// Reward links

pub async fn create_link(
    State(state): State<AppState>,
    _: AdminAuth,
    Json(payload): Json<NewLink>,
) -> Result<Json<RewardLink>, ApiError> {
    Ok(Json(state.engine.create_link(payload)?))
}

pub async fn list_links(
    State(state): State<AppState>,
    _: AdminAuth,
) -> Result<Json<Vec<RewardLink>>, ApiError> {
    Ok(Json(state.engine.links()?))
}

pub async fn disable_link(
    State(state): State<AppState>,
    _: AdminAuth,
    Path(token): Path<String>,
) -> Result<Json<RewardLink>, ApiError> {
    Ok(Json(state.engine.disable_link(&token)?))
}

// Leaderboard

#[derive(Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub epoch: u64,
}

pub async fn reset_leaderboard(State(state): State<AppState>, _: AdminAuth) -> Json<ResetResponse> {
    Json(ResetResponse {
        success: true,
        epoch: state.engine.reset_leaderboard(),
    })
}

#[derive(Deserialize)]
pub struct RewardTopRequest {
    pub limit: usize,
    #[serde(flatten)]
    pub grant: RewardGrant,
}

pub async fn reward_top(
    State(state): State<AppState>,
    _: AdminAuth,
    Json(payload): Json<RewardTopRequest>,
) -> Result<Json<TopRewardReport>, ApiError> {
    Ok(Json(state.engine.reward_top(payload.limit, payload.grant)?))
}

// Catalog

#[derive(Serialize)]
pub struct CatalogSummary {
    pub success: bool,
    pub symbols: usize,
    pub wheel_rewards: usize,
    pub albums: usize,
    pub events: usize,
    pub shop_items: usize,
}

impl From<&CompiledCatalog> for CatalogSummary {
    fn from(compiled: &CompiledCatalog) -> Self {
        Self {
            success: true,
            symbols: compiled.symbols.len(),
            wheel_rewards: compiled.wheel.as_ref().map_or(0, |table| table.len()),
            albums: compiled.albums.len(),
            events: compiled.catalog.events.len(),
            shop_items: compiled.active_shop_items().len(),
        }
    }
}

pub async fn get_catalog(
    State(state): State<AppState>,
    _: AdminAuth,
) -> Result<Json<Catalog>, ApiError> {
    Ok(Json(state.engine.catalog()?.catalog.clone()))
}

pub async fn replace_catalog(
    State(state): State<AppState>,
    _: AdminAuth,
    Json(catalog): Json<Catalog>,
) -> Result<Json<CatalogSummary>, ApiError> {
    let compiled = state.engine.replace_catalog(catalog).inspect_err(|e| {
        tracing::warn!("rejected catalog update: {}", e);
    })?;
    Ok(Json(CatalogSummary::from(compiled.as_ref())))
}

pub async fn reload_catalog(
    State(state): State<AppState>,
    _: AdminAuth,
) -> Result<Json<CatalogSummary>, ApiError> {
    let Some(path) = state.config.catalog_path.as_ref() else {
        return Err(ApiError::BadRequest(
            "CATALOG_PATH is not configured".to_string(),
        ));
    };
    let compiled = state.engine.reload_catalog_from(path).inspect_err(|e| {
        tracing::warn!("catalog reload from {} failed: {}", path.display(), e);
    })?;
    Ok(Json(CatalogSummary::from(compiled.as_ref())))
}

// Store

// Sent once the payment issuer has confirmed the charge
#[derive(Deserialize)]
pub struct ConfirmPurchaseRequest {
    pub external_id: String,
    pub item: String,
    pub payment_ref: String,
    pub stars: u64,
}

pub async fn confirm_purchase(
    State(state): State<AppState>,
    _: AdminAuth,
    Json(payload): Json<ConfirmPurchaseRequest>,
) -> Result<Json<PurchaseReceipt>, ApiError> {
    let user_id = state
        .engine
        .find_user(payload.external_id.trim())?
        .ok_or_else(|| EngineError::not_found("user", payload.external_id.trim()))?;
    Ok(Json(state.engine.confirm_purchase(
        user_id,
        &payload.item,
        &payload.payment_ref,
        payload.stars,
    )?))
}

// Broadcast

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub id: u64,
    pub delivered: usize,
}

pub async fn broadcast(
    State(state): State<AppState>,
    _: AdminAuth,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    let delivered = broadcast_to_all(
        &state.notification_manager,
        NotificationType::Broadcast {
            message: message.to_string(),
        },
    );
    let record = state
        .broadcasts
        .record(message, delivered, state.engine.now());
    tracing::info!(id = record.id, delivered, "broadcast sent");
    Ok(Json(BroadcastResponse {
        success: true,
        id: record.id,
        delivered,
    }))
}

pub async fn list_broadcasts(
    State(state): State<AppState>,
    _: AdminAuth,
) -> Json<Vec<BroadcastRecord>> {
    Json(state.broadcasts.recent())
}
