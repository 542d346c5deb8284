//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    game_codes, gift_cards, health, orders, products, promo_codes, settings, users,
};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for the API.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for the back-office.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /api/products`, `GET /api/products/:id` - Catalog
/// - `GET /api/settings/payment` - Payment settings
/// - `GET /api/orders/verify` - Guest order verification
/// - `GET /api/orders/track/:id` - Read an order with a tracking token
///
/// ## Optional sign-in
/// - `POST /api/orders` - Checkout
/// - `POST /api/promo-codes/validate` - Promo code preview
///
/// ## Signed-in users
/// - `POST /api/users`, `GET /api/users/me` - Profile
/// - `GET /api/wallet`, `GET /api/wallet/transactions` - Wallet
/// - `POST /api/gift-cards/redeem` - Redeem a gift card
/// - `GET /api/orders`, `GET /api/orders/:id` - Own orders
///
/// ## Staff
/// - `PATCH /api/orders/:id/status` - Order lifecycle
/// - `/api/admin/*` - Back-office
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        // Orders
        .route("/orders", get(orders::admin_list_orders))
        .route("/orders/:id", get(orders::admin_get_order))
        .route("/orders/:id/game-codes", post(orders::attach_game_codes))
        // Catalog
        .route(
            "/products",
            get(products::admin_list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            put(products::update_product).delete(products::deactivate_product),
        )
        // Promotions
        .route(
            "/promo-codes",
            get(promo_codes::list_promo_codes).post(promo_codes::create_promo_code),
        )
        .route("/promo-codes/:id", put(promo_codes::update_promo_code))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/:id", patch(users::update_user))
        .route("/users/:id/wallet", post(users::adjust_wallet))
        // Inventory
        .route(
            "/game-codes",
            get(game_codes::list_game_codes).post(game_codes::add_game_codes),
        )
        .route(
            "/gift-cards",
            get(gift_cards::list_gift_cards).post(gift_cards::issue_gift_cards),
        )
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Catalog
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .route("/promo-codes/validate", post(promo_codes::validate_promo_code))
        .route(
            "/settings/payment",
            get(settings::get_payment_settings).post(settings::update_payment_settings),
        )
        // Users and wallet
        .route("/users", post(users::register_user))
        .route("/users/me", get(users::get_me))
        .route("/wallet", get(users::get_wallet))
        .route("/wallet/transactions", get(users::list_wallet_transactions))
        .route("/gift-cards/redeem", post(gift_cards::redeem_gift_card))
        // Orders
        .route(
            "/orders",
            post(orders::create_order).get(orders::list_my_orders),
        )
        .route("/orders/verify", get(orders::verify_order))
        .route("/orders/track/:id", get(orders::track_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/api", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
