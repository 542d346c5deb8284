//! User profile and wallet handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use storefront_core::{format_cents, Capability, User, UserId, WalletChange, WalletTransaction};
use storefront_store::UserUpdate;

use crate::auth::{AuthUser, Staff};
use crate::error::ApiError;
use crate::handlers::Page;
use crate::state::AppState;

/// Profile registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Contact email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Phone number.
    pub phone: Option<String>,
}

/// Register the caller's profile. Registering twice returns the existing one.
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<User>, ApiError> {
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".into()));
    }
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }

    let mut user = User::new(auth.user_id, email, body.name.trim().to_string(), Utc::now());
    user.phone = body.phone.filter(|p| !p.trim().is_empty());
    let user = state.store.register_user(&user).await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok(Json(user))
}

/// The caller's profile.
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.profile(&auth.user_id).await?))
}

/// Wallet balance response.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    /// Balance in cents.
    pub balance_cents: i64,
    /// Balance formatted as dollars.
    pub balance_formatted: String,
}

/// The caller's wallet balance.
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<WalletResponse>, ApiError> {
    let user = state.profile(&auth.user_id).await?;
    Ok(Json(WalletResponse {
        balance_cents: user.wallet_balance_cents,
        balance_formatted: format_cents(user.wallet_balance_cents),
    }))
}

/// Ledger page response.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// Transactions, newest first.
    pub transactions: Vec<WalletTransaction>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

async fn ledger_page(
    state: &AppState,
    user_id: &UserId,
    page: Page,
) -> Result<TransactionsResponse, ApiError> {
    // One extra row tells whether another page exists.
    let limit = page.limit();
    let mut transactions = state
        .store
        .list_wallet_transactions(user_id, limit + 1, page.offset)
        .await?;
    let has_more = transactions.len() > limit;
    transactions.truncate(limit);
    Ok(TransactionsResponse {
        transactions,
        has_more,
    })
}

/// The caller's wallet ledger.
pub async fn list_wallet_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(page): Query<Page>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    state.profile(&auth.user_id).await?;
    Ok(Json(ledger_page(&state, &auth.user_id, page).await?))
}

// ============================================================================
// Staff
// ============================================================================

/// User list response.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    /// Users, oldest first.
    pub users: Vec<User>,
}

/// List users.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Query(page): Query<Page>,
) -> Result<Json<UserListResponse>, ApiError> {
    staff.require(Capability::ManageUsers)?;
    let users = state.store.list_users(page.limit(), page.offset).await?;
    Ok(Json(UserListResponse { users }))
}

fn parse_user_id(user_id: &str) -> Result<UserId, ApiError> {
    user_id
        .parse()
        .map_err(|_| ApiError::NotFound(format!("User not found: {user_id}")))
}

/// Change a user's profile, role or disabled flag.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(user_id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    staff.require(Capability::ManageUsers)?;
    let user_id = parse_user_id(&user_id)?;
    let user = state.store.update_user(&user_id, &body, Utc::now()).await?;

    tracing::info!(
        user_id = %user.id,
        role = %user.role,
        disabled = user.disabled,
        actor = %staff.actor(),
        "User updated"
    );

    Ok(Json(user))
}

/// Manual wallet adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustWalletRequest {
    /// Signed amount in cents: positive credits, negative debits.
    pub amount_cents: i64,
    /// Reason, recorded on the ledger entry.
    pub reason: String,
}

/// Credit or debit a user's wallet.
pub async fn adjust_wallet(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(user_id): Path<String>,
    Json(body): Json<AdjustWalletRequest>,
) -> Result<Json<WalletTransaction>, ApiError> {
    staff.require(Capability::AdjustWallets)?;
    let user_id = parse_user_id(&user_id)?;
    if body.amount_cents == 0 {
        return Err(ApiError::BadRequest("Amount must not be zero".into()));
    }
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest("A reason is required".into()));
    }

    let change = WalletChange::adjustment(body.amount_cents, reason.to_string())?;
    let transaction = state
        .store
        .adjust_wallet(&user_id, change, Utc::now())
        .await?;

    tracing::info!(
        user_id = %user_id,
        amount_cents = body.amount_cents,
        actor = %staff.actor(),
        "Wallet adjusted by staff"
    );

    Ok(Json(transaction))
}
