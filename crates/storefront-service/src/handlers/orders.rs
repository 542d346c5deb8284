//! Order handlers: checkout, customer and guest lookups, staff lifecycle.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use storefront_core::{
    Capability, Checkout, CheckoutItem, ContactInfo, GameCode, GameCodeFilter, Order,
    OrderFilter, OrderId, OrderStatus, PaymentMethod, Transition, MAX_PAGE_SIZE,
};

use crate::auth::{AuthUser, MaybeUser, Staff};
use crate::crypto::{tracking_token, verify_tracking_token};
use crate::error::ApiError;
use crate::handlers::Page;
use crate::state::AppState;

/// An order together with the game codes the viewer may see.
#[derive(Debug, Serialize)]
pub struct OrderView {
    /// The order.
    #[serde(flatten)]
    pub order: Order,
    /// Attached game codes.
    pub game_codes: Vec<String>,
}

/// Order list response.
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    /// Orders, newest first.
    pub orders: Vec<Order>,
}

fn parse_order_id(order_id: &str) -> Result<OrderId, ApiError> {
    order_id
        .parse()
        .map_err(|_| ApiError::NotFound(format!("Order not found: {order_id}")))
}

async fn load_order(state: &AppState, order_id: &OrderId) -> Result<Order, ApiError> {
    state
        .store
        .get_order(order_id, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))
}

/// Build the view. Customers only see codes once the order is delivered.
async fn order_view(state: &AppState, order: Order, staff: bool) -> Result<OrderView, ApiError> {
    let mut game_codes = Vec::new();
    if staff || order.status == OrderStatus::Delivered {
        let mut filter = GameCodeFilter {
            order_id: Some(order.id),
            limit: Some(MAX_PAGE_SIZE),
            ..GameCodeFilter::default()
        };
        // One page per listing; an order can hold more codes than that.
        loop {
            let page = state.store.list_game_codes(&filter).await?;
            let last = page.len() < MAX_PAGE_SIZE;
            game_codes.extend(page.into_iter().map(|c| c.code));
            if last {
                break;
            }
            filter.offset += MAX_PAGE_SIZE;
        }
    }
    Ok(OrderView { order, game_codes })
}

// ============================================================================
// Checkout
// ============================================================================

/// Checkout request.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Cart lines.
    pub items: Vec<CheckoutItem>,
    /// Contact details.
    pub contact: ContactInfo,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Promo code.
    pub promo_code: Option<String>,
    /// Wallet amount to apply, in cents.
    #[serde(default)]
    pub wallet_amount_cents: i64,
}

/// Checkout response.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    /// The new order's ID, used for the confirmation page.
    pub order_id: String,
    /// Human-facing order number.
    pub order_number: String,
    /// Token for reading the order without signing in.
    pub tracking_token: String,
    /// The order.
    pub order: Order,
}

/// Place an order. Guests may check out; wallet use needs a signed-in user.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let checkout = Checkout {
        user_id: user.map(|u| u.user_id),
        items: body.items,
        contact: body.contact,
        payment_method: body.payment_method,
        promo_code: body.promo_code,
        wallet_amount_cents: body.wallet_amount_cents,
    };

    let order = state.store.place_order(&checkout, Utc::now()).await?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        user_id = ?order.user_id,
        payment_method = %order.payment_method,
        total_amount_cents = order.total_amount_cents,
        wallet_amount_used_cents = order.wallet_amount_used_cents,
        promo_code = ?order.promo_code,
        "Order placed"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: order.id.to_string(),
            order_number: order.order_number.clone(),
            tracking_token: tracking_token(&state.config.tracking_secret, &order.id),
            order,
        }),
    ))
}

/// The caller's orders.
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(page): Query<Page>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let filter = OrderFilter {
        user_id: Some(auth.user_id),
        limit: Some(page.limit()),
        offset: page.offset,
        ..OrderFilter::default()
    };
    let orders = state.store.list_orders(&filter, Utc::now()).await?;
    Ok(Json(OrderListResponse { orders }))
}

/// An order, for its owner or for staff.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let id = parse_order_id(&order_id)?;
    let order = load_order(&state, &id).await?;

    let is_owner = order.user_id == Some(auth.user_id);
    let is_staff = !is_owner
        && state
            .store
            .get_user(&auth.user_id)
            .await?
            .is_some_and(|u| u.can(Capability::ManageOrders));
    if !is_owner && !is_staff {
        return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
    }

    Ok(Json(order_view(&state, order, is_staff).await?))
}

// ============================================================================
// Guest verification and tracking
// ============================================================================

/// Guest verification query.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    /// Order number (`ORD-...`) or order ID.
    pub order_number: String,
    /// Contact email of the order.
    pub email: String,
    /// Contact phone of the order.
    pub phone: String,
}

/// Guest verification response.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Whether the details matched an order.
    pub success: bool,
    /// Order ID on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Tracking token on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_token: Option<String>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Verify order ownership by number, email and phone.
///
/// Only an exact match succeeds; every mismatch looks the same to the caller.
pub async fn verify_order(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let reference = query.order_number.trim();
    let order = match reference.parse::<OrderId>() {
        Ok(id) => state.store.get_order(&id, now).await?,
        Err(_) => state.store.get_order_by_number(reference, now).await?,
    };

    match order.filter(|o| o.contact.matches(&query.email, &query.phone)) {
        Some(order) => Ok(Json(VerifyResponse {
            success: true,
            order_id: Some(order.id.to_string()),
            tracking_token: Some(tracking_token(&state.config.tracking_secret, &order.id)),
            message: None,
        })
        .into_response()),
        None => {
            tracing::debug!(reference = %reference, "Order verification failed");
            Ok((
                StatusCode::NOT_FOUND,
                Json(VerifyResponse {
                    success: false,
                    order_id: None,
                    tracking_token: None,
                    message: Some("No order matches these details".into()),
                }),
            )
                .into_response())
        }
    }
}

/// Tracking query.
#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    /// Token from checkout or verification.
    pub token: String,
}

/// Read an order with a tracking token.
pub async fn track_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<OrderView>, ApiError> {
    let id = parse_order_id(&order_id)?;
    if !verify_tracking_token(&state.config.tracking_secret, &id, &query.token) {
        return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
    }
    let order = load_order(&state, &id).await?;
    Ok(Json(order_view(&state, order, false).await?))
}

// ============================================================================
// Staff
// ============================================================================

/// Status update request. `status` accepts only the defined statuses.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target status.
    pub status: OrderStatus,
    /// Cancellation reason, required for `cancelled`.
    pub reason: Option<String>,
}

/// Move an order to another status.
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(order_id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<OrderView>, ApiError> {
    staff.require(Capability::ManageOrders)?;
    let id = parse_order_id(&order_id)?;
    let transition = Transition::to_status(body.status, body.reason);

    let order = state
        .store
        .transition_order(&id, &transition, Utc::now())
        .await?;

    tracing::info!(
        order_id = %order.id,
        status = %order.status,
        payment_status = %order.payment_status,
        actor = %staff.actor(),
        "Order status updated by staff"
    );

    Ok(Json(order_view(&state, order, true).await?))
}

/// List all orders. Overdue bank transfers are cancelled first.
pub async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<OrderListResponse>, ApiError> {
    staff.require(Capability::ManageOrders)?;
    let orders = state.store.list_orders(&filter, Utc::now()).await?;
    Ok(Json(OrderListResponse { orders }))
}

/// Any order, with all attached codes.
pub async fn admin_get_order(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    staff.require(Capability::ManageOrders)?;
    let id = parse_order_id(&order_id)?;
    let order = load_order(&state, &id).await?;
    Ok(Json(order_view(&state, order, true).await?))
}

/// Attach codes request.
#[derive(Debug, Deserialize)]
pub struct AttachCodesRequest {
    /// Explicit pool codes.
    #[serde(default)]
    pub codes: Vec<String>,
    /// Cover the remaining lines from the pool.
    #[serde(default)]
    pub auto_fill: bool,
}

/// Attach codes response.
#[derive(Debug, Serialize)]
pub struct AttachCodesResponse {
    /// Every code now on the order.
    pub game_codes: Vec<GameCode>,
}

/// Attach game codes to an order.
pub async fn attach_game_codes(
    State(state): State<Arc<AppState>>,
    staff: Staff,
    Path(order_id): Path<String>,
    Json(body): Json<AttachCodesRequest>,
) -> Result<Json<AttachCodesResponse>, ApiError> {
    staff.require(Capability::ManageOrders)?;
    if body.codes.is_empty() && !body.auto_fill {
        return Err(ApiError::BadRequest(
            "Give codes to attach or set auto_fill".into(),
        ));
    }
    let id = parse_order_id(&order_id)?;
    let game_codes = state
        .store
        .attach_game_codes(&id, &body.codes, body.auto_fill, Utc::now())
        .await?;

    tracing::info!(
        order_id = %id,
        count = game_codes.len(),
        actor = %staff.actor(),
        "Game codes attached"
    );

    Ok(Json(AttachCodesResponse { game_codes }))
}
