//! Admin authentication integration tests.

mod common;

use common::TestHarness;
use serde_json::json;
use xcredits_core::UserId;

#[tokio::test]
async fn admin_routes_require_the_key() {
    let harness = TestHarness::new();

    for uri in [
        "/v1/admin/pricing/rules",
        "/v1/admin/redeem-codes",
        "/v1/admin/registrations",
    ] {
        harness.server.get(uri).await.assert_status_unauthorized();
    }

    harness
        .server
        .post("/v1/admin/orders/sweep")
        .add_header("x-admin-key", "not-the-key")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn user_jwt_does_not_open_admin_routes() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/admin/pricing/rules")
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn admin_id_header_is_recorded_as_creator() {
    let harness = TestHarness::new();
    let admin = UserId::generate();

    let response = harness
        .server
        .post("/v1/admin/redeem-codes")
        .add_header("x-admin-key", harness.admin_key_header())
        .add_header("x-admin-id", admin.to_string())
        .json(&json!({ "count": 1, "credits": 5, "description": "launch promo" }))
        .await;

    response.assert_status_ok();
    let codes: Vec<serde_json::Value> = response.json();
    assert_eq!(codes[0]["created_by"], admin.to_string());
    assert_eq!(codes[0]["description"], "launch promo");
}

#[tokio::test]
async fn malformed_admin_id_is_bad_request() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/admin/pricing/rules")
        .add_header("x-admin-key", harness.admin_key_header())
        .add_header("x-admin-id", "admin-7")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn pricing_rules_are_listed_in_path_order() {
    let harness = TestHarness::new();
    for (path, credits) in [("/b", 2), ("/a", 1), ("/c", 3)] {
        harness
            .server
            .put("/v1/admin/pricing")
            .add_header("x-admin-key", harness.admin_key_header())
            .json(&json!({ "path": path, "credits": credits }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get("/v1/admin/pricing/rules")
        .add_header("x-admin-key", harness.admin_key_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let paths: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(paths, ["/a", "/b", "/c"]);
}
