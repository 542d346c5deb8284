//! Staff role and back-office integration tests.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use common::{cart, contact, TestHarness, ADMIN_KEY_HEADER};
use serde_json::{json, Value};

use storefront_core::{ProductId, UserId};

#[tokio::test]
async fn wrong_admin_key_is_unauthorized() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/api/admin/orders")
        .add_header(ADMIN_KEY_HEADER, HeaderValue::from_static("wrong-key"))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn customer_is_forbidden_from_back_office() {
    let harness = TestHarness::new();
    harness.register_test_user().await;

    for path in [
        "/api/admin/orders",
        "/api/admin/products",
        "/api/admin/users",
        "/api/admin/game-codes",
        "/api/admin/gift-cards",
    ] {
        harness
            .server
            .get(path)
            .add_header(AUTHORIZATION, harness.user_auth_header())
            .await
            .assert_status_forbidden();
    }
}

#[tokio::test]
async fn manager_manages_orders_but_not_users() {
    let harness = TestHarness::new();
    let manager = UserId::generate();
    harness.register_staff(&manager, "manager").await;
    let manager_auth = TestHarness::auth_header_for(&manager);

    harness
        .server
        .get("/api/admin/orders")
        .add_header(AUTHORIZATION, manager_auth.clone())
        .await
        .assert_status_ok();

    harness
        .server
        .get("/api/admin/users")
        .add_header(AUTHORIZATION, manager_auth.clone())
        .await
        .assert_status_forbidden();

    harness
        .server
        .post("/api/settings/payment")
        .add_header(AUTHORIZATION, manager_auth)
        .json(&json!({ "bank_name": "Test Bank" }))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn promoted_admin_manages_users() {
    let harness = TestHarness::new();
    let admin = UserId::generate();
    harness.register_staff(&admin, "admin").await;
    harness.register_test_user().await;

    let response = harness
        .server
        .get("/api/admin/users")
        .add_header(AUTHORIZATION, TestHarness::auth_header_for(&admin))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn staff_reads_any_order_with_profile_role() {
    let harness = TestHarness::new();
    let manager = UserId::generate();
    harness.register_staff(&manager, "manager").await;
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    let placed: Value = harness
        .server
        .post("/api/orders")
        .json(&json!({
            "items": cart(&product_id, 1),
            "contact": contact(),
            "payment_method": "bank_transfer"
        }))
        .await
        .json();

    let response = harness
        .server
        .get(&format!("/api/orders/{}", placed["order_id"].as_str().unwrap()))
        .add_header(AUTHORIZATION, TestHarness::auth_header_for(&manager))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn disabled_staff_loses_access() {
    let harness = TestHarness::new();
    let manager = UserId::generate();
    harness.register_staff(&manager, "manager").await;

    harness
        .server
        .patch(&format!("/api/admin/users/{manager}"))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "disabled": true }))
        .await
        .assert_status_ok();

    harness
        .server
        .get("/api/admin/orders")
        .add_header(AUTHORIZATION, TestHarness::auth_header_for(&manager))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn disabled_customer_cannot_check_out() {
    let harness = TestHarness::new();
    harness.register_test_user().await;
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    harness
        .server
        .patch(&format!("/api/admin/users/{}", harness.test_user_id))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "disabled": true }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/api/orders")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({
            "items": cart(&product_id, 1),
            "contact": contact(),
            "payment_method": "bank_transfer"
        }))
        .await;

    response.assert_status_forbidden();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "account_disabled");
}

#[tokio::test]
async fn updating_unknown_user_is_not_found() {
    let harness = TestHarness::new();

    harness
        .server
        .patch(&format!("/api/admin/users/{}", UserId::generate()))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "name": "Ghost" }))
        .await
        .assert_status_not_found();
}

// ============================================================================
// Game code pool
// ============================================================================

#[tokio::test]
async fn game_code_pool_lists_unused_codes() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    harness.add_codes(&product_id, &["KEY-1", "KEY-2"]).await;

    let placed: Value = harness
        .server
        .post("/api/orders")
        .json(&json!({
            "items": cart(&product_id, 1),
            "contact": contact(),
            "payment_method": "bank_transfer"
        }))
        .await
        .json();
    harness
        .server
        .post(&format!(
            "/api/admin/orders/{}/game-codes",
            placed["order_id"].as_str().unwrap()
        ))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "auto_fill": true }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/api/admin/game-codes")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .add_query_param("product_id", &product_id)
        .add_query_param("unused_only", true)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["game_codes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_game_code_conflicts() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    harness.add_codes(&product_id, &["KEY-1"]).await;

    harness
        .server
        .post("/api/admin/game-codes")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "product_id": product_id, "codes": ["KEY-1"] }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn game_codes_for_unknown_product_are_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/api/admin/game-codes")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "product_id": ProductId::generate().to_string(), "codes": ["KEY-1"] }))
        .await
        .assert_status_not_found();
}
