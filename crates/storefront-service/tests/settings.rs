//! Payment settings integration tests.

mod common;

use common::{cart, contact, TestHarness, ADMIN_KEY_HEADER};
use serde_json::{json, Value};

#[tokio::test]
async fn defaults_are_public() {
    let harness = TestHarness::new();

    let response = harness.server.get("/api/settings/payment").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["cod_fee_cents"], 500);
    assert_eq!(body["payment_deadline_days"], 5);
    assert_eq!(body["bank_transfer_enabled"], true);
}

#[tokio::test]
async fn update_changes_checkout_fee() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;

    let response = harness
        .server
        .post("/api/settings/payment")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({
            "bank_name": "Test Bank",
            "account_holder": "Storefront Ltd",
            "iban": "DE89 3704 0044 0532 0130 00",
            "cod_fee_cents": 750
        }))
        .await;
    response.assert_status_ok();

    let body: Value = harness.server.get("/api/settings/payment").await.json();
    assert_eq!(body["bank_name"], "Test Bank");

    let response = harness
        .server
        .post("/api/orders")
        .json(&json!({
            "items": cart(&product_id, 1),
            "contact": contact(),
            "payment_method": "cash_on_delivery"
        }))
        .await;
    let order: Value = response.json();
    assert_eq!(order["order"]["cod_fee_cents"], 750);
    assert_eq!(order["order"]["total_amount_cents"], 5750);
}

#[tokio::test]
async fn disabled_method_is_rejected_at_checkout() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Space Raiders", 5000, 10).await;
    harness
        .server
        .post("/api/settings/payment")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "cod_enabled": false }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/api/orders")
        .json(&json!({
            "items": cart(&product_id, 1),
            "contact": contact(),
            "payment_method": "cash_on_delivery"
        }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "payment_method_disabled");
}

#[tokio::test]
async fn negative_fee_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/api/settings/payment")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({ "cod_fee_cents": -1 }))
        .await
        .assert_status_bad_request();
}
