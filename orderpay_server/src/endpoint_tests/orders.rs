use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;

use super::helpers::TestServer;

#[actix_web::test]
async fn health_check() {
    let server = TestServer::new().await;
    let (status, _) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn create_and_fetch_an_order() {
    let server = TestServer::new().await;
    let order = server.create_order(5000).await;
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["version"], 1);
    assert_eq!(order["currency"], "USD");
    assert_eq!(order["amount"], 5000);

    let (status, body) = server.get(&format!("/orders/{}", order["id"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], order);
}

#[actix_web::test]
async fn invalid_orders_are_rejected() {
    let server = TestServer::new().await;
    let (status, body) = server
        .post(
            "/orders",
            json!({"buyer_id": "alice", "seller_id": "bob", "product_id": "widget-1", "amount": 0, "currency": "usd"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("must be positive"));

    let (status, body) = server
        .post("/orders", json!({"buyer_id": "alice", "seller_id": "bob", "product_id": "widget-1", "amount": 100}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let req = TestRequest::post().uri("/orders").insert_header(("Content-Type", "application/json")).set_payload("{");
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn unknown_orders_are_not_found() {
    let server = TestServer::new().await;
    let (status, body) = server.get("/orders/no-such-order").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn stale_cancellations_conflict() {
    let server = TestServer::new().await;
    let order = server.create_order(5000).await;
    let path = format!("/orders/{}/cancel", order["id"].as_str().unwrap());

    let (status, body) = server.post(&path, json!({"expected_version": 1})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");
    assert_eq!(body["data"]["version"], 2);

    let (status, body) = server.post(&path, json!({"expected_version": 1})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn only_paid_orders_ship() {
    let server = TestServer::new().await;
    let order = server.create_order(5000).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let (status, _) = server.post(&format!("/orders/{order_id}/ship"), json!({"expected_version": 1})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (order_id, _) = server.paid_order(5000).await;
    let (_, body) = server.get(&format!("/orders/{order_id}")).await;
    let version = body["data"]["version"].as_i64().unwrap();
    let (status, body) = server.post(&format!("/orders/{order_id}/ship"), json!({"expected_version": version})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SHIPPED");
    let (status, body) =
        server.post(&format!("/orders/{order_id}/deliver"), json!({"expected_version": version + 1})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "DELIVERED");

    let (status, body) = server.get(&format!("/orders/{order_id}/history")).await;
    assert_eq!(status, StatusCode::OK);
    let statuses = body["data"].as_array().unwrap().iter().map(|c| c["new_status"].clone()).collect::<Vec<_>>();
    assert_eq!(statuses, vec![json!("AUTHORIZING"), json!("PAID"), json!("SHIPPED"), json!("DELIVERED")]);
}

#[actix_web::test]
async fn orders_are_listed_by_role() {
    let server = TestServer::new().await;
    server.create_order(1000).await;
    server.create_order(2000).await;

    let (status, body) = server.get("/users/alice/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let (_, body) = server.get("/users/bob/orders?role=seller&limit=1").await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let (_, body) = server.get("/users/bob/orders").await;
    assert_eq!(body["data"]["total"], 0);

    let (status, body) = server.get("/users/alice/orders?role=admin").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = server.get("/users/alice/order_stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_orders"], 2);
    assert_eq!(body["data"]["counts"]["PENDING"], 2);
}
