use std::{collections::HashMap, time::Duration};

use cucumber::World;
use log::*;
use orderpay_engine::{
    db_types::{Order, OrderId},
    events::EventProducers,
    test_utils::{
        prepare_env::{create_database, random_db_path, run_migrations},
        SimulatedGateway,
    },
    traits::{LifecycleError, OrderManagement},
    Ack,
    EngineConfig,
    OrderStore,
    PaymentCoordinator,
    RefundCoordinator,
    RetryPolicy,
    SqliteDatabase,
    WebhookDispatcher,
    WebhookReconciler,
};

const WEBHOOK_SECRET: &str = "whsec_cucumber";

#[derive(Default, Debug, World)]
pub struct LifecycleWorld {
    pub system: Option<LifecycleSystem>,
    /// Scenario aliases for order ids
    pub orders: HashMap<String, OrderId>,
    /// Order snapshots taken by a client, used to submit stale versions
    pub snapshots: HashMap<String, Order>,
    pub last_result: Option<Result<(), LifecycleError>>,
    pub last_ack: Option<Ack>,
}

#[derive(Debug)]
pub struct LifecycleSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: SimulatedGateway,
    pub orders: OrderStore<SqliteDatabase>,
    pub payments: PaymentCoordinator<SqliteDatabase, SimulatedGateway>,
    pub refunds: RefundCoordinator<SqliteDatabase, SimulatedGateway>,
    pub webhooks: WebhookDispatcher<SqliteDatabase, SimulatedGateway>,
}

impl LifecycleWorld {
    pub fn system(&self) -> &LifecycleSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn order_id(&self, alias: &str) -> OrderId {
        self.orders.get(alias).cloned().unwrap_or_else(|| panic!("No order called [{alias}] in this scenario"))
    }

    pub async fn order(&self, alias: &str) -> Order {
        let id = self.order_id(alias);
        self.system().db.fetch_order(&id).await.expect("Error fetching order").expect("Order does not exist")
    }

    /// The id of the authorization attached to the order.
    pub async fn authorization_id(&self, alias: &str) -> String {
        self.order(alias).await.authorization_id.unwrap_or_else(|| panic!("Order [{alias}] has no authorization"))
    }

    pub fn record<T>(&mut self, result: Result<T, LifecycleError>) {
        if let Err(e) = &result {
            debug!("🚀️ Request failed: {e}");
        }
        self.last_result = Some(result.map(|_| ()));
    }
}

impl LifecycleSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let config = EngineConfig {
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            ..EngineConfig::new(WEBHOOK_SECRET)
        };
        let producers = EventProducers::default();
        let gateway = SimulatedGateway::new(WEBHOOK_SECRET);
        let orders = OrderStore::new(db.clone(), config.clone(), producers.clone());
        let payments = PaymentCoordinator::new(db.clone(), gateway.clone(), config.clone(), producers.clone());
        let refunds = RefundCoordinator::new(db.clone(), gateway.clone(), config.clone(), producers.clone());
        let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), config.clone(), producers);
        let webhooks = WebhookDispatcher::new(reconciler, config.webhook_workers, config.webhook_timeout);
        Self { db_path: url, db, gateway, orders, payments, refunds, webhooks }
    }
}
