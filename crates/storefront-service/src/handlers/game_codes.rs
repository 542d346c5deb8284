//! Game code pool handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use storefront_core::{Capability, EditionId, GameCode, GameCodeFilter, ProductId};

use crate::auth::Staff;
use crate::error::ApiError;
use crate::state::AppState;

/// Largest number of codes accepted in one request.
const MAX_CODES_PER_REQUEST: usize = 1000;

/// Add codes request.
#[derive(Debug, Deserialize)]
pub struct AddCodesRequest {
    /// Product the codes unlock.
    pub product_id: Option<ProductId>,
    /// Edition the codes unlock.
    pub edition_id: Option<EditionId>,
    /// The codes.
    pub codes: Vec<String>,
}

/// Game code list response.
#[derive(Debug, Serialize)]
pub struct GameCodeListResponse {
    /// Matching codes.
    pub game_codes: Vec<GameCode>,
}

/// Add codes to the pool. Duplicates abort the whole batch.
pub async fn add_game_codes(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Json(body): Json<AddCodesRequest>,
) -> Result<(StatusCode, Json<GameCodeListResponse>), ApiError> {
    staff.require(Capability::ManageGiftCards)?;
    if body.codes.is_empty() || body.codes.len() > MAX_CODES_PER_REQUEST {
        return Err(ApiError::BadRequest(format!(
            "Between 1 and {MAX_CODES_PER_REQUEST} codes are required"
        )));
    }
    if let Some(product_id) = body.product_id {
        let product = state
            .store
            .get_product(&product_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))?;
        if let Some(edition_id) = body.edition_id {
            if product.edition(&edition_id).is_none() {
                return Err(ApiError::NotFound(format!(
                    "Edition not found: {edition_id}"
                )));
            }
        }
    }

    let now = Utc::now();
    let game_codes = body
        .codes
        .iter()
        .map(|code| GameCode::new(code, body.product_id, body.edition_id, now))
        .collect::<Result<Vec<_>, _>>()?;
    state.store.add_game_codes(&game_codes).await?;

    tracing::info!(
        count = game_codes.len(),
        product_id = ?body.product_id,
        actor = %staff.actor(),
        "Game codes added"
    );

    Ok((StatusCode::CREATED, Json(GameCodeListResponse { game_codes })))
}

/// List codes by product, order or usage.
pub async fn list_game_codes(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Query(filter): Query<GameCodeFilter>,
) -> Result<Json<GameCodeListResponse>, ApiError> {
    staff.require(Capability::ManageGiftCards)?;
    let game_codes = state.store.list_game_codes(&filter).await?;
    Ok(Json(GameCodeListResponse { game_codes }))
}
