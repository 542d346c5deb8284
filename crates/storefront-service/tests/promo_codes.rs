//! Promo code integration tests.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use common::{cart, contact, TestHarness, ADMIN_KEY_HEADER};
use serde_json::{json, Value};

#[tokio::test]
async fn validate_previews_discount() {
    let harness = TestHarness::new();
    harness
        .create_promo(json!({
            "code": "WELCOME10",
            "description": "10% off your first order",
            "discount": { "type": "percentage", "percent": 10 }
        }))
        .await;

    let response = harness
        .server
        .post("/api/promo-codes/validate")
        .json(&json!({ "code": " welcome10 ", "subtotal_cents": 5000 }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["code"], "WELCOME10");
    assert_eq!(body["discount_cents"], 500);
    assert_eq!(body["discount_formatted"], "$5.00");
}

#[tokio::test]
async fn unknown_code_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/promo-codes/validate")
        .json(&json!({ "code": "NOPE", "subtotal_cents": 5000 }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_promo_code");
}

#[tokio::test]
async fn minimum_order_is_enforced() {
    let harness = TestHarness::new();
    harness
        .create_promo(json!({
            "code": "BIG5",
            "discount": { "type": "fixed", "amount_cents": 500 },
            "min_order_cents": 10000
        }))
        .await;

    let response = harness
        .server
        .post("/api/promo-codes/validate")
        .json(&json!({ "code": "BIG5", "subtotal_cents": 5000 }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn per_customer_cap_applies_to_guest_email() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    harness
        .create_promo(json!({
            "code": "ONCE",
            "discount": { "type": "fixed", "amount_cents": 1000 },
            "max_uses_per_user": 1
        }))
        .await;

    let order = json!({
        "items": cart(&product_id, 1),
        "contact": contact(),
        "payment_method": "bank_transfer",
        "promo_code": "ONCE"
    });
    harness
        .server
        .post("/api/orders")
        .json(&order)
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness.server.post("/api/orders").json(&order).await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_promo_code");
}

#[tokio::test]
async fn global_cap_is_enforced_and_kept_on_update() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    let promo = harness
        .create_promo(json!({
            "code": "LIMITED",
            "discount": { "type": "fixed", "amount_cents": 1000 },
            "max_uses": 1
        }))
        .await;

    harness
        .server
        .post("/api/orders")
        .json(&json!({
            "items": cart(&product_id, 1),
            "contact": contact(),
            "payment_method": "bank_transfer",
            "promo_code": "LIMITED"
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness
        .server
        .put(&format!("/api/admin/promo-codes/{}", promo["id"].as_str().unwrap()))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({
            "code": "LIMITED",
            "description": "Renamed",
            "discount": { "type": "fixed", "amount_cents": 1000 },
            "max_uses": 1
        }))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["used_count"], 1);

    let response = harness
        .server
        .post("/api/promo-codes/validate")
        .json(&json!({ "code": "LIMITED", "subtotal_cents": 5000 }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn duplicate_code_conflicts() {
    let harness = TestHarness::new();
    let promo = json!({
        "code": "DUP",
        "discount": { "type": "fixed", "amount_cents": 100 }
    });
    harness.create_promo(promo.clone()).await;

    let response = harness
        .server
        .post("/api/admin/promo-codes")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&promo)
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn listing_promo_codes_requires_staff() {
    let harness = TestHarness::new();
    harness.register_test_user().await;

    harness
        .server
        .get("/api/admin/promo-codes")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .assert_status_forbidden();

    harness
        .server
        .get("/api/admin/promo-codes")
        .await
        .assert_status_unauthorized();
}
