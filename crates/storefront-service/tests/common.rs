//! Common test utilities for storefront integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use storefront_core::UserId;
use storefront_service::{create_router, AppState, ServiceConfig};
use storefront_store::MemoryStore;

/// Header carrying the bootstrap admin key.
pub const ADMIN_KEY_HEADER: HeaderName = HeaderName::from_static("x-admin-key");

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The bootstrap admin key.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with an empty in-memory store.
    pub fn new() -> Self {
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            database_url: None,
            database_max_connections: 1,
            auth_base_url: "http://localhost".into(),
            auth_audience: "storefront".into(),
            admin_api_key: Some(admin_api_key.clone()),
            tracking_secret: "test-tracking-secret".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        };

        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            test_user_id: UserId::generate(),
            admin_api_key,
        }
    }

    /// Authorization header for the test user.
    pub fn user_auth_header(&self) -> HeaderValue {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Authorization header for any user.
    pub fn auth_header_for(user_id: &UserId) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer test-token:{user_id}"))
            .expect("valid header value")
    }

    /// The admin key header value.
    pub fn admin_key_header(&self) -> HeaderValue {
        HeaderValue::from_str(&self.admin_api_key).expect("valid header value")
    }

    /// Register a profile for `user_id`.
    pub async fn register(&self, user_id: &UserId, email: &str) -> Value {
        let response = self
            .server
            .post("/api/users")
            .add_header(AUTHORIZATION, Self::auth_header_for(user_id))
            .json(&json!({ "email": email, "name": "Test User", "phone": "+1 555 0100" }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Register the test user.
    pub async fn register_test_user(&self) -> Value {
        self.register(&self.test_user_id, "player@example.com").await
    }

    /// Register `user_id` and give it `role`.
    pub async fn register_staff(&self, user_id: &UserId, role: &str) {
        self.register(user_id, "staff@example.com").await;
        self.server
            .patch(&format!("/api/admin/users/{user_id}"))
            .add_header(ADMIN_KEY_HEADER, self.admin_key_header())
            .json(&json!({ "role": role }))
            .await
            .assert_status_ok();
    }

    /// Credit a user's wallet through a staff adjustment.
    pub async fn fund(&self, user_id: &UserId, amount_cents: i64) {
        self.server
            .post(&format!("/api/admin/users/{user_id}/wallet"))
            .add_header(ADMIN_KEY_HEADER, self.admin_key_header())
            .json(&json!({ "amount_cents": amount_cents, "reason": "Test funding" }))
            .await
            .assert_status_ok();
    }

    /// The wallet balance of `user_id`.
    pub async fn balance(&self, user_id: &UserId) -> i64 {
        let response = self
            .server
            .get("/api/wallet")
            .add_header(AUTHORIZATION, Self::auth_header_for(user_id))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["balance_cents"].as_i64().expect("balance")
    }

    /// Create a product and return its ID.
    pub async fn create_product(&self, product: Value) -> String {
        let response = self
            .server
            .post("/api/admin/products")
            .add_header(ADMIN_KEY_HEADER, self.admin_key_header())
            .json(&product)
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        body["id"].as_str().expect("product id").to_string()
    }

    /// A game priced at `price_cents` with `stock` units.
    pub async fn create_game(&self, name: &str, price_cents: i64, stock: i64) -> String {
        self.create_product(json!({
            "name": name,
            "category": "action",
            "platform": "steam",
            "kind": "game",
            "price_cents": price_cents,
            "stock": stock
        }))
        .await
    }

    /// Add pool codes for a product.
    pub async fn add_codes(&self, product_id: &str, codes: &[&str]) {
        self.server
            .post("/api/admin/game-codes")
            .add_header(ADMIN_KEY_HEADER, self.admin_key_header())
            .json(&json!({ "product_id": product_id, "codes": codes }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    /// Create a promo code.
    pub async fn create_promo(&self, promo: Value) -> Value {
        let response = self
            .server
            .post("/api/admin/promo-codes")
            .add_header(ADMIN_KEY_HEADER, self.admin_key_header())
            .json(&promo)
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    /// Set an order's status as the admin.
    pub async fn set_status(&self, order_id: &str, status: &str) -> axum_test::TestResponse {
        self.server
            .patch(&format!("/api/orders/{order_id}/status"))
            .add_header(ADMIN_KEY_HEADER, self.admin_key_header())
            .json(&json!({ "status": status, "reason": "Requested by customer" }))
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Contact details used by checkout tests.
pub fn contact() -> Value {
    json!({
        "name": "Test Buyer",
        "email": "Buyer@Example.com",
        "phone": "+1 555 0100",
        "address": "1 Test Street"
    })
}

/// A single-line cart.
pub fn cart(product_id: &str, quantity: u32) -> Value {
    json!([{ "product_id": product_id, "quantity": quantity }])
}
