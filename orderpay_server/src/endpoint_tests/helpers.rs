use std::time::Duration;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use log::debug;
use orderpay_engine::{
    events::EventProducers,
    test_utils::{prepare_env::test_database, SimulatedGateway},
    EngineConfig,
    RetryPolicy,
    SqliteDatabase,
    WebhookDispatcher,
    WebhookReconciler,
};
use serde_json::{json, Value};

use crate::server::configure_app;

pub const WEBHOOK_SECRET: &str = "whsec_endpoint_tests";

/// A migrated throwaway database and a simulated gateway, wired into the real routes.
pub struct TestServer {
    pub db: SqliteDatabase,
    pub gateway: SimulatedGateway,
    pub config: EngineConfig,
}

impl TestServer {
    pub async fn new() -> Self {
        let _ = env_logger::try_init();
        let db = test_database().await;
        let gateway = SimulatedGateway::new(WEBHOOK_SECRET);
        let config = EngineConfig {
            retry: RetryPolicy {
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            gateway_timeout: Duration::from_secs(2),
            ..EngineConfig::new(WEBHOOK_SECRET)
        };
        Self { db, gateway, config }
    }

    /// Sends the request through a fresh app instance and returns the status and the JSON body (or `Null` when the
    /// body is not JSON).
    pub async fn call(&self, req: TestRequest) -> (StatusCode, Value) {
        let db = self.db.clone();
        let gateway = self.gateway.clone();
        let config = self.config.clone();
        let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), config.clone(), EventProducers::default());
        let dispatcher = web::Data::new(WebhookDispatcher::new(reconciler, 4, Duration::from_secs(5)));
        let app = App::new()
            .configure(move |cfg| configure_app(cfg, db, gateway, &config, EventProducers::default(), dispatcher));
        let service = test::init_service(app).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        debug!("🚀️ Response {status}: {}", String::from_utf8_lossy(&body));
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.call(TestRequest::get().uri(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.call(TestRequest::post().uri(path).set_json(body)).await
    }

    /// Creates an order from alice to bob and returns its JSON representation.
    pub async fn create_order(&self, amount: i64) -> Value {
        let (status, body) = self
            .post(
                "/orders",
                json!({"buyer_id": "alice", "seller_id": "bob", "product_id": "widget-1", "amount": amount, "currency": "usd"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    /// Creates an order and an authorization for it. Returns `(order_id, authorization)`.
    pub async fn authorized_order(&self, amount: i64) -> (String, Value) {
        let order = self.create_order(amount).await;
        let order_id = order["id"].as_str().expect("order id").to_string();
        let (status, body) =
            self.post("/payments", json!({"order_id": order_id, "amount": amount, "currency": "USD"})).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (order_id, body["data"].clone())
    }

    /// An order that has been paid through a synchronous confirmation. Returns `(order_id, authorization_id)`.
    pub async fn paid_order(&self, amount: i64) -> (String, String) {
        let (order_id, auth) = self.authorized_order(amount).await;
        let auth_id = auth["id"].as_str().expect("authorization id").to_string();
        let (status, body) = self
            .post(&format!("/payments/{auth_id}/confirm"), json!({"client_secret": auth["client_secret"]}))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "SUCCEEDED");
        (order_id, auth_id)
    }
}
