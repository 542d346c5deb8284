//! Catalog integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_KEY_HEADER};
use serde_json::{json, Value};

#[tokio::test]
async fn list_products_filters_and_sorts() {
    let harness = TestHarness::new();
    harness.create_game("Zeta Racer", 3000, 5).await;
    harness.create_game("Alpha Quest", 6000, 5).await;
    harness
        .create_product(json!({
            "name": "Steam Card $20",
            "category": "gift-cards",
            "kind": "gift_card",
            "price_cents": 2000,
            "stock": 50
        }))
        .await;

    let response = harness
        .server
        .get("/api/products")
        .add_query_param("category", "action")
        .add_query_param("sort", "price_asc")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let products = body["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["name"], "Zeta Racer");
    assert_eq!(products[1]["name"], "Alpha Quest");
}

#[tokio::test]
async fn search_is_case_insensitive() {
    let harness = TestHarness::new();
    harness.create_game("Zeta Racer", 3000, 5).await;
    harness.create_game("Alpha Quest", 6000, 5).await;

    let response = harness
        .server
        .get("/api/products")
        .add_query_param("search", "QUEST")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let products = body["products"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["name"], "Alpha Quest");
}

#[tokio::test]
async fn deactivated_product_is_hidden_from_customers() {
    let harness = TestHarness::new();
    let product_id = harness.create_game("Zeta Racer", 3000, 5).await;

    harness
        .server
        .delete(&format!("/api/admin/products/{product_id}"))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .await
        .assert_status_ok();

    harness
        .server
        .get(&format!("/api/products/{product_id}"))
        .await
        .assert_status_not_found();

    let body: Value = harness.server.get("/api/products").await.json();
    assert!(body["products"].as_array().unwrap().is_empty());

    let response = harness
        .server
        .get("/api/admin/products")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    assert_eq!(body["products"][0]["active"], false);
}

#[tokio::test]
async fn update_product_keeps_id_and_editions() {
    let harness = TestHarness::new();
    let product_id = harness
        .create_product(json!({
            "name": "Alpha Quest",
            "category": "rpg",
            "kind": "game",
            "price_cents": 6000,
            "editions": [
                { "name": "Standard", "price_cents": 6000, "stock": 3 },
                { "name": "Deluxe", "price_cents": 9000, "stock": 1 }
            ]
        }))
        .await;

    let product: Value = harness
        .server
        .get(&format!("/api/products/{product_id}"))
        .await
        .json();
    let deluxe_id = product["editions"][1]["id"].clone();

    let response = harness
        .server
        .put(&format!("/api/admin/products/{product_id}"))
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({
            "name": "Alpha Quest",
            "category": "rpg",
            "kind": "game",
            "price_cents": 5000,
            "flags": { "on_sale": true },
            "sale_price_cents": 4000,
            "editions": [
                { "id": deluxe_id, "name": "Deluxe", "price_cents": 8000, "stock": 2 }
            ]
        }))
        .await;

    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["id"], product_id.as_str());
    assert_eq!(updated["price_cents"], 5000);
    assert_eq!(updated["flags"]["on_sale"], true);
    assert_eq!(updated["editions"].as_array().unwrap().len(), 1);
    assert_eq!(updated["editions"][0]["id"], deluxe_id);
}

#[tokio::test]
async fn credit_product_needs_credit_value() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/admin/products")
        .add_header(ADMIN_KEY_HEADER, harness.admin_key_header())
        .json(&json!({
            "name": "Wallet Top-up",
            "category": "credit",
            "kind": "credit",
            "price_cents": 1000
        }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/api/products/not-a-product")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn creating_product_requires_staff() {
    let harness = TestHarness::new();
    harness.register_test_user().await;

    let response = harness
        .server
        .post("/api/admin/products")
        .add_header(axum::http::header::AUTHORIZATION, harness.user_auth_header())
        .json(&json!({
            "name": "Zeta Racer",
            "category": "action",
            "kind": "game",
            "price_cents": 3000
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}
