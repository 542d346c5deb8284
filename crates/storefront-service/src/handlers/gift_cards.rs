//! Gift card handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Capability, GiftCard, WalletTransaction, MAX_BATCH_SIZE};

use crate::auth::{AuthUser, Staff};
use crate::error::ApiError;
use crate::handlers::Page;
use crate::state::AppState;

/// Gift card redemption request.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// The card code as typed.
    pub code: String,
}

/// Gift card redemption response.
#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    /// Credited value in cents.
    pub value_cents: i64,
    /// Wallet balance after the deposit.
    pub balance_cents: i64,
    /// The ledger entry.
    pub transaction: WalletTransaction,
}

/// Redeem a gift card into the caller's wallet.
pub async fn redeem_gift_card(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    if body.code.trim().is_empty() {
        return Err(ApiError::BadRequest("Gift card code is required".into()));
    }
    let redemption = state
        .store
        .redeem_gift_card(&body.code, &auth.user_id, Utc::now())
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        gift_card_id = %redemption.gift_card.id,
        value_cents = redemption.gift_card.value_cents,
        "Gift card redeemed"
    );

    Ok(Json(RedeemResponse {
        value_cents: redemption.gift_card.value_cents,
        balance_cents: redemption.transaction.balance_after_cents,
        transaction: redemption.transaction,
    }))
}

// ============================================================================
// Staff
// ============================================================================

/// Gift card batch request.
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    /// Value of each card in cents.
    pub value_cents: i64,
    /// Number of cards.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Expiry of the batch.
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_count() -> u32 {
    1
}

/// Gift card list response.
#[derive(Debug, Serialize)]
pub struct GiftCardListResponse {
    /// Gift cards, newest first.
    pub gift_cards: Vec<GiftCard>,
}

/// Issue a batch of gift cards.
pub async fn issue_gift_cards(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Json(body): Json<IssueRequest>,
) -> Result<(StatusCode, Json<GiftCardListResponse>), ApiError> {
    staff.require(Capability::ManageGiftCards)?;
    if body.count == 0 || body.count > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "Count must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }

    let now = Utc::now();
    let gift_cards = (0..body.count)
        .map(|_| GiftCard::issue(body.value_cents, body.expires_at, now))
        .collect::<Result<Vec<_>, _>>()?;
    state.store.add_gift_cards(&gift_cards).await?;

    tracing::info!(
        count = gift_cards.len(),
        value_cents = body.value_cents,
        actor = %staff.actor(),
        "Gift cards issued"
    );

    Ok((StatusCode::CREATED, Json(GiftCardListResponse { gift_cards })))
}

/// List gift cards.
pub async fn list_gift_cards(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Query(page): Query<Page>,
) -> Result<Json<GiftCardListResponse>, ApiError> {
    staff.require(Capability::ManageGiftCards)?;
    let gift_cards = state.store.list_gift_cards(page.limit(), page.offset).await?;
    Ok(Json(GiftCardListResponse { gift_cards }))
}
