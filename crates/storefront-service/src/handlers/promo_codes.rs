//! Promo code handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{
    format_cents, Capability, Discount, DomainError, PromoCode, PromoCodeId, Redeemer,
};

use crate::auth::{MaybeUser, Staff};
use crate::error::ApiError;
use crate::state::AppState;

/// Promo code preview request.
#[derive(Debug, Deserialize)]
pub struct ValidatePromoRequest {
    /// The code as typed by the customer.
    pub code: String,
    /// Cart subtotal in cents.
    pub subtotal_cents: i64,
}

/// Promo code preview response.
#[derive(Debug, Serialize)]
pub struct ValidatePromoResponse {
    /// Normalized code.
    pub code: String,
    /// Promo description.
    pub description: String,
    /// Discount that would apply, in cents.
    pub discount_cents: i64,
    /// Discount formatted as dollars.
    pub discount_formatted: String,
}

/// Preview the discount a code gives on a subtotal.
///
/// Per-customer caps are checked for signed-in callers; guests are checked at
/// checkout, where their email is known.
pub async fn validate_promo_code(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Json(body): Json<ValidatePromoRequest>,
) -> Result<Json<ValidatePromoResponse>, ApiError> {
    if body.subtotal_cents < 0 {
        return Err(ApiError::BadRequest("subtotal must not be negative".into()));
    }
    let code = PromoCode::normalize(&body.code);
    let promo = state
        .store
        .find_promo_code(&code)
        .await?
        .ok_or_else(|| DomainError::PromoNotFound(code.clone()))?;

    let uses = match &user {
        Some(user) => {
            state
                .store
                .count_promo_usages(&promo.id, &Redeemer::User(user.user_id))
                .await?
        }
        None => 0,
    };
    let discount_cents = promo.check(body.subtotal_cents, uses, Utc::now())?;

    Ok(Json(ValidatePromoResponse {
        code: promo.code,
        description: promo.description,
        discount_cents,
        discount_formatted: format_cents(discount_cents),
    }))
}

// ============================================================================
// Staff
// ============================================================================

/// Promo code create/update request.
#[derive(Debug, Deserialize)]
pub struct PromoInput {
    /// Code; normalized to upper case.
    pub code: String,
    /// Description shown to customers.
    #[serde(default)]
    pub description: String,
    /// Discount rule.
    pub discount: Discount,
    /// Minimum subtotal in cents.
    #[serde(default)]
    pub min_order_cents: i64,
    /// Global usage cap.
    pub max_uses: Option<u32>,
    /// Per-customer usage cap.
    pub max_uses_per_user: Option<u32>,
    /// Valid from.
    pub starts_at: Option<DateTime<Utc>>,
    /// Valid until.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the code can be redeemed.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl PromoInput {
    fn into_promo(self, existing: Option<&PromoCode>) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            id: existing.map_or_else(PromoCodeId::generate, |p| p.id),
            code: PromoCode::normalize(&self.code),
            description: self.description,
            discount: self.discount,
            min_order_cents: self.min_order_cents,
            max_uses: self.max_uses,
            max_uses_per_user: self.max_uses_per_user,
            used_count: existing.map_or(0, |p| p.used_count),
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            active: self.active,
            created_at: existing.map_or(now, |p| p.created_at),
            updated_at: now,
        }
    }
}

/// Promo code list response.
#[derive(Debug, Serialize)]
pub struct PromoListResponse {
    /// All promo codes, newest first.
    pub promo_codes: Vec<PromoCode>,
}

/// List promo codes.
pub async fn list_promo_codes(
    State(state): State<Arc<AppState>>,
    staff: Staff,
) -> Result<Json<PromoListResponse>, ApiError> {
    staff.require(Capability::ManagePromotions)?;
    let promo_codes = state.store.list_promo_codes().await?;
    Ok(Json(PromoListResponse { promo_codes }))
}

/// Create a promo code.
pub async fn create_promo_code(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Json(body): Json<PromoInput>,
) -> Result<(StatusCode, Json<PromoCode>), ApiError> {
    staff.require(Capability::ManagePromotions)?;
    let promo = body.into_promo(None);
    promo.validate()?;
    state.store.put_promo_code(&promo).await?;

    tracing::info!(code = %promo.code, actor = %staff.actor(), "Promo code created");

    Ok((StatusCode::CREATED, Json(promo)))
}

/// Update a promo code. The usage count is kept.
pub async fn update_promo_code(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(promo_id): Path<String>,
    Json(body): Json<PromoInput>,
) -> Result<Json<PromoCode>, ApiError> {
    staff.require(Capability::ManagePromotions)?;
    let id: PromoCodeId = promo_id
        .parse()
        .map_err(|_| ApiError::NotFound(format!("Promo code not found: {promo_id}")))?;
    let existing = state
        .store
        .get_promo_code(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Promo code not found: {promo_id}")))?;

    let promo = body.into_promo(Some(&existing));
    promo.validate()?;
    state.store.put_promo_code(&promo).await?;

    tracing::info!(code = %promo.code, actor = %staff.actor(), "Promo code updated");

    Ok(Json(promo))
}
