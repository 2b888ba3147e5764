use actix_web::{http::StatusCode, test::TestRequest};
use orderpay_engine::{db_types::AuthorizationStatus, EventKind};
use serde_json::json;

use super::helpers::TestServer;
use crate::routes::SIGNATURE_HEADER;

fn delivery(payload: Vec<u8>, signature: &str) -> TestRequest {
    TestRequest::post()
        .uri("/webhook")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((SIGNATURE_HEADER, signature))
        .set_payload(payload)
}

#[actix_web::test]
async fn redelivered_events_are_acknowledged_once() {
    let server = TestServer::new().await;
    server.gateway.set_confirm_outcome(AuthorizationStatus::Processing);
    let (order_id, auth) = server.authorized_order(5000).await;
    let auth_id = auth["id"].as_str().unwrap();
    server.post(&format!("/payments/{auth_id}/confirm"), json!({})).await;

    let (payload, signature) =
        server.gateway.webhook("evt_100", EventKind::Authorization(AuthorizationStatus::Succeeded), auth_id);
    let (status, body) = server.call(delivery(payload.clone(), &signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "data": {"ack": "applied"}}));

    let (status, body) = server.call(delivery(payload, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ack"], "duplicate");

    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "PAID");
    let (_, body) = server.get(&format!("/orders/{order_id}/history")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn conflicting_events_are_discarded() {
    let server = TestServer::new().await;
    let (order_id, auth_id) = server.paid_order(5000).await;
    let (payload, signature) =
        server.gateway.webhook("evt_200", EventKind::Authorization(AuthorizationStatus::Failed), &auth_id);
    let (status, body) = server.call(delivery(payload, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ack"], "discarded");
    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    assert_eq!(body["data"]["status"], "PAID");
}

#[actix_web::test]
async fn unsigned_deliveries_are_unauthorized() {
    let server = TestServer::new().await;
    let (_, auth) = server.authorized_order(5000).await;
    let (payload, _) = server.gateway.webhook(
        "evt_300",
        EventKind::Authorization(AuthorizationStatus::Succeeded),
        auth["id"].as_str().unwrap(),
    );
    let (status, body) = server.call(delivery(payload.clone(), "bm90IGEgc2lnbmF0dXJl")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let req = TestRequest::post().uri("/webhook").set_payload(payload);
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn malformed_events_are_bad_requests() {
    let server = TestServer::new().await;
    let payload = br#"{"id": "evt_400", "type": "authorization.exploded", "created": 0, "data": {"object_id": "a"}}"#;
    let signature = server.gateway.sign(payload);
    let (status, body) = server.call(delivery(payload.to_vec(), &signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn events_for_unknown_payments_are_not_found() {
    let server = TestServer::new().await;
    let (payload, signature) =
        server.gateway.webhook("evt_500", EventKind::Authorization(AuthorizationStatus::Succeeded), "auth_unknown");
    let (status, _) = server.call(delivery(payload, &signature)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
