use actix_web::http::StatusCode;
use orderpay_engine::db_types::{AuthorizationStatus, RefundStatus};
use serde_json::json;

use super::helpers::TestServer;

#[actix_web::test]
async fn pay_for_an_order() {
    let server = TestServer::new().await;
    let (order_id, auth) = server.authorized_order(5000).await;
    assert_eq!(auth["status"], "REQUIRES_CONFIRMATION");
    assert_eq!(auth["currency"], "USD");
    assert!(auth["client_secret"].is_string());
    let auth_id = auth["id"].as_str().unwrap();

    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "AUTHORIZING");
    assert_eq!(body["data"]["authorization_id"], auth_id);

    let (status, body) = server
        .post(&format!("/payments/{auth_id}/confirm"), json!({"client_secret": auth["client_secret"]}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SUCCEEDED");
    // The secret is only handed out when the payment is created
    assert!(body["data"].get("client_secret").is_none());

    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "PAID");

    let (status, body) = server.post(&format!("/payments/{auth_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn confirmation_without_a_body() {
    let server = TestServer::new().await;
    server.gateway.set_confirm_outcome(AuthorizationStatus::Processing);
    let (order_id, auth) = server.authorized_order(5000).await;
    let (status, body) = server.post(&format!("/payments/{}/confirm", auth["id"].as_str().unwrap()), json!(null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PROCESSING");
    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "AUTHORIZING");
}

#[actix_web::test]
async fn wrong_client_secret_is_rejected() {
    let server = TestServer::new().await;
    let (_, auth) = server.authorized_order(5000).await;
    let (status, body) = server
        .post(&format!("/payments/{}/confirm", auth["id"].as_str().unwrap()), json!({"client_secret": "guess"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn mismatched_amounts_are_rejected() {
    let server = TestServer::new().await;
    let order = server.create_order(5000).await;
    let (status, body) =
        server.post("/payments", json!({"order_id": order["id"], "amount": 4000, "currency": "usd"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = server.post("/payments", json!({"order_id": "missing", "amount": 4000, "currency": "usd"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn gateway_outages_are_service_unavailable() {
    let server = TestServer::new().await;
    let order = server.create_order(5000).await;
    server.gateway.fail_next(10);
    let (status, body) =
        server.post("/payments", json!({"order_id": order["id"], "amount": 5000, "currency": "usd"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(!body["error"].as_str().unwrap().contains("Simulated"));

    let (_, body) = server.get(&format!("/orders/{}", order["id"].as_str().unwrap())).await;
    assert_eq!(body["data"]["status"], "PENDING");
}

#[actix_web::test]
async fn payment_history_and_sync() {
    let server = TestServer::new().await;
    server.gateway.set_confirm_outcome(AuthorizationStatus::Processing);
    let (order_id, auth) = server.authorized_order(5000).await;
    let auth_id = auth["id"].as_str().unwrap();
    server.post(&format!("/payments/{auth_id}/confirm"), json!({})).await;
    server.gateway.settle_authorization(auth_id, AuthorizationStatus::Succeeded);

    let (status, body) = server.get(&format!("/payments/{auth_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SUCCEEDED");
    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "PAID");

    let (status, body) = server.get("/users/alice/payments?page=1&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], auth_id);

    let (status, _) = server.get("/payments/auth_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn refunds_respect_the_captured_amount() {
    let server = TestServer::new().await;
    let (order_id, auth_id) = server.paid_order(10_000).await;

    let (status, body) =
        server.post("/refunds", json!({"authorization_id": auth_id, "amount": 6000, "reason": "damaged"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "SUCCEEDED");
    let refund_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = server.post("/refunds", json!({"authorization_id": auth_id, "amount": 5000})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("exceeds"));

    let (status, body) = server.post("/refunds", json!({"authorization_id": auth_id})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["amount"], 4000);

    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "REFUNDED");

    let (status, body) = server.get(&format!("/refunds/{refund_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reason"], "damaged");

    let (_, body) = server.get("/users/alice/refunds").await;
    assert_eq!(body["data"]["total"], 2);
    let (status, body) = server.get("/users/alice/refund_stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_refunded"], 10_000);
}

#[actix_web::test]
async fn pending_refunds_can_be_cancelled() {
    let server = TestServer::new().await;
    let (_, auth_id) = server.paid_order(10_000).await;
    server.gateway.set_refund_outcome(RefundStatus::Requested);
    let (_, body) = server.post("/refunds", json!({"authorization_id": auth_id, "amount": 2500})).await;
    assert_eq!(body["data"]["status"], "REQUESTED");
    let refund_id = body["data"]["id"].as_str().unwrap();

    let (status, body) = server.post(&format!("/refunds/{refund_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, _) = server.post(&format!("/refunds/{refund_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
