use axum::{Json, extract::State};
use engine::shop::ShopItem;

use crate::{AppState, error::ApiError};

// Star packs on sale; paying for them happens with the external issuer
pub async fn get_store(State(state): State<AppState>) -> Result<Json<Vec<ShopItem>>, ApiError> {
    Ok(Json(state.engine.shop_items()?))
}
