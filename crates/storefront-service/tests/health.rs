//! Health check integration tests.

mod common;

use common::TestHarness;

#[tokio::test]
async fn health_reports_store_status() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "storefront");
    assert_eq!(body["store"], true);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let harness = TestHarness::new();

    let response = harness.server.get("/api/nope").await;

    response.assert_status_not_found();
}
