//! Client tests against a mocked storefront.

use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_client::{CheckoutRequest, ClientError, StorefrontClient};
use storefront_core::{
    CheckoutItem, ContactInfo, OrderId, OrderStatus, PaymentMethod, ProductFilter, ProductId,
};

fn order_json(id: &OrderId) -> Value {
    json!({
        "id": id.to_string(),
        "order_number": id.order_number(),
        "user_id": null,
        "contact": {
            "name": "Ada",
            "email": "ada@example.com",
            "phone": "+1 555 0100",
            "address": null,
            "notes": null
        },
        "items": [],
        "payment_method": "bank_transfer",
        "status": "pending",
        "payment_status": "pending",
        "subtotal_cents": 5000,
        "promo_code": "WELCOME10",
        "promo_discount_cents": 500,
        "wallet_amount_used_cents": 0,
        "cod_fee_cents": 0,
        "total_amount_cents": 4500,
        "payment_deadline": "2026-01-06T00:00:00Z",
        "cancelled_reason": null,
        "cashback_credited": false,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
        "paid_at": null,
        "delivered_at": null,
        "cancelled_at": null
    })
}

fn checkout() -> CheckoutRequest {
    CheckoutRequest {
        items: vec![CheckoutItem {
            product_id: ProductId::generate(),
            edition_id: None,
            quantity: 1,
        }],
        contact: ContactInfo {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: "+1 555 0100".into(),
            address: None,
            notes: None,
        },
        payment_method: PaymentMethod::BankTransfer,
        promo_code: Some("WELCOME10".into()),
        wallet_amount_cents: 0,
    }
}

#[tokio::test]
async fn create_order_returns_placed_order() {
    let server = MockServer::start().await;
    let order_id = OrderId::generate();
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "order_id": order_id.to_string(),
            "order_number": order_id.order_number(),
            "tracking_token": "abc123",
            "order": order_json(&order_id)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let placed = client.create_order(&checkout()).await.unwrap();

    assert_eq!(placed.order_id, order_id.to_string());
    assert_eq!(placed.tracking_token, "abc123");
    assert_eq!(placed.order.total_amount_cents, 4500);
    assert_eq!(placed.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn insufficient_balance_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "code": "insufficient_balance",
                "message": "insufficient wallet balance: balance=100, required=2500",
                "details": { "balance": 100, "required": 2500 }
            }
        })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri())
        .unwrap()
        .with_token("jwt");
    let err = client.create_order(&checkout()).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::InsufficientBalance {
            balance: 100,
            required: 2500
        }
    ));
}

#[tokio::test]
async fn verify_mismatch_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/verify"))
        .and(query_param("email", "ada@example.com"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "message": "No order matches these details"
        })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let verified = client
        .verify_order("ORD-0000000000", "ada@example.com", "+1 555 0100")
        .await
        .unwrap();

    assert!(verified.is_none());
}

#[tokio::test]
async fn verify_match_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/verify"))
        .and(query_param("order_number", "ORD-0000000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "order_id": "01J00000000000000000000000",
            "tracking_token": "abc123"
        })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let verified = client
        .verify_order("ORD-0000000000", "ada@example.com", "+1 555 0100")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(verified.tracking_token, "abc123");
}

#[tokio::test]
async fn track_order_sends_token_and_reads_codes() {
    let server = MockServer::start().await;
    let order_id = OrderId::generate();
    let mut body = order_json(&order_id);
    body["game_codes"] = json!(["AAAA-1111"]);
    Mock::given(method("GET"))
        .and(path(format!("/api/orders/track/{order_id}")))
        .and(query_param("token", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let view = client
        .track_order(&order_id.to_string(), "abc123")
        .await
        .unwrap();

    assert_eq!(view.order.id, order_id);
    assert_eq!(view.game_codes, vec!["AAAA-1111".to_string()]);
}

#[tokio::test]
async fn wallet_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/wallet"))
        .and(header("authorization", "Bearer jwt-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "balance_cents": 1234,
            "balance_formatted": "$12.34"
        })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri())
        .unwrap()
        .with_token("jwt-token");
    let wallet = client.wallet().await.unwrap();

    assert_eq!(wallet.balance_cents, 1234);
}

#[tokio::test]
async fn redeem_gift_card_posts_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/gift-cards/redeem"))
        .and(body_json(json!({ "code": "GC-ABCD" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {
                "code": "gift_card_redeemed",
                "message": "gift card already redeemed"
            }
        })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri())
        .unwrap()
        .with_token("jwt");
    let err = client.redeem_gift_card("GC-ABCD").await.unwrap_err();

    match err {
        ClientError::Api { code, status, .. } => {
            assert_eq!(code, "gift_card_redeemed");
            assert_eq!(status, 409);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_product_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "not_found", "message": "Product not found: missing" }
        })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let err = client.get_product("missing").await.unwrap_err();

    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn list_products_passes_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("category", "action"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "products": [] })))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let filter = ProductFilter {
        category: Some("action".into()),
        ..ProductFilter::default()
    };
    let products = client.list_products(&filter).await.unwrap();

    assert!(products.is_empty());
}

#[tokio::test]
async fn non_json_error_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings/payment"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = StorefrontClient::new(server.uri()).unwrap();
    let err = client.payment_settings().await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 502, .. }));
}
