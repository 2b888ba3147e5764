#![allow(dead_code)]
use std::{collections::BTreeMap, time::Duration};

use log::*;
use orderpay_common::MinorUnits;
use orderpay_engine::{
    db_types::{Authorization, Order, OrderId, OrderStatusType},
    events::EventProducers,
    test_utils::{
        prepare_env::{drop_database, prepare_test_env, random_db_path},
        SimulatedGateway,
    },
    traits::{LifecycleError, OrderManagement},
    Ack,
    EngineConfig,
    EventKind,
    MaintenanceApi,
    OrderStore,
    PaymentCoordinator,
    RefundCoordinator,
    RetryPolicy,
    SqliteDatabase,
    WebhookDispatcher,
    WebhookReconciler,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_4f1c";

pub fn test_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        gateway_timeout: Duration::from_secs(2),
        webhook_timeout: Duration::from_secs(5),
        ..EngineConfig::new(WEBHOOK_SECRET)
    }
}

pub struct TestSystem {
    pub url: String,
    pub db: SqliteDatabase,
    pub gateway: SimulatedGateway,
    pub config: EngineConfig,
    pub orders: OrderStore<SqliteDatabase>,
    pub payments: PaymentCoordinator<SqliteDatabase, SimulatedGateway>,
    pub refunds: RefundCoordinator<SqliteDatabase, SimulatedGateway>,
    pub webhooks: WebhookDispatcher<SqliteDatabase, SimulatedGateway>,
    pub maintenance: MaintenanceApi<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_config(test_config(), EventProducers::default()).await
    }

    pub async fn with_config(config: EngineConfig, producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created test database: {url}");
        let gateway = SimulatedGateway::new(WEBHOOK_SECRET);
        let orders = OrderStore::new(db.clone(), config.clone(), producers.clone());
        let payments = PaymentCoordinator::new(db.clone(), gateway.clone(), config.clone(), producers.clone());
        let refunds = RefundCoordinator::new(db.clone(), gateway.clone(), config.clone(), producers.clone());
        let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), config.clone(), producers);
        let webhooks = WebhookDispatcher::new(reconciler, config.webhook_workers, config.webhook_timeout);
        let maintenance = MaintenanceApi::new(db.clone(), config.clone());
        Self { url, db, gateway, config, orders, payments, refunds, webhooks, maintenance }
    }

    pub async fn pending_order(&self, amount: i64) -> Order {
        self.orders
            .create_order("alice", "bob", "widget-1", MinorUnits::from(amount), "usd")
            .await
            .expect("Error creating order")
    }

    /// A pending order with an authorization awaiting confirmation.
    pub async fn authorizing_order(&self, amount: i64) -> (Order, Authorization) {
        let order = self.pending_order(amount).await;
        let auth = self
            .payments
            .create_authorization(MinorUnits::from(amount), "usd", &order.id, BTreeMap::new())
            .await
            .expect("Error creating authorization");
        (self.order(&order.id).await, auth)
    }

    pub async fn paid_order(&self, amount: i64) -> (Order, Authorization) {
        let (order, auth) = self.authorizing_order(amount).await;
        let auth = self.payments.confirm_authorization(&auth.id, None).await.expect("Error confirming authorization");
        let order = self.order(&order.id).await;
        assert_eq!(order.status, OrderStatusType::Paid);
        (order, auth)
    }

    pub async fn order(&self, id: &OrderId) -> Order {
        self.db.fetch_order(id).await.expect("Error fetching order").expect("Order does not exist")
    }

    pub async fn deliver(&self, event_id: &str, kind: EventKind, object_id: &str) -> Result<Ack, LifecycleError> {
        let (payload, signature) = self.gateway.webhook(event_id, kind, object_id);
        self.webhooks.dispatch(&payload, &signature).await
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&self.url).await;
    }
}
