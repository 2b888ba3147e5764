use std::time::Duration;

use actix_web::{
    dev::Server,
    http::KeepAlive,
    middleware::{Condition, Logger},
    web,
    App,
    HttpServer,
};
use log::*;
use orderpay_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderAnnulledEvent},
    traits::{LifecycleDatabase, PaymentGateway},
    EngineConfig,
    OrderStore,
    PaymentCoordinator,
    RefundCoordinator,
    SqliteDatabase,
    WebhookDispatcher,
    WebhookReconciler,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    gateway_client::HttpPaymentGateway,
    maintenance_worker::start_maintenance_worker,
    routes::{
        health,
        CancelOrderRoute,
        CancelPaymentRoute,
        CancelRefundRoute,
        ConfirmPaymentRoute,
        CreateOrderRoute,
        CreatePaymentRoute,
        CreateRefundRoute,
        DeliverOrderRoute,
        GatewayWebhookRoute,
        GetOrderRoute,
        GetPaymentRoute,
        GetRefundRoute,
        OrderHistoryRoute,
        OrderStatsRoute,
        OrdersForUserRoute,
        PaymentsForUserRoute,
        RefundStatsRoute,
        RefundsForUserRoute,
        ShipOrderRoute,
    },
};

const AUDIT_EVENT_BUFFER_SIZE: usize = 128;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = HttpPaymentGateway::new(&config.gateway)?;
    let handlers = create_audit_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _worker = start_maintenance_worker(db.clone(), config.engine.clone(), config.maintenance_interval);
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance<G>(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: G,
    producers: EventProducers,
) -> Result<Server, ServerError>
where
    G: PaymentGateway + Send + Sync + 'static,
{
    // The dispatcher's worker pool is shared by every actix worker, so it is built once, out here
    let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), config.engine.clone(), producers.clone());
    let dispatcher = web::Data::new(WebhookDispatcher::new(
        reconciler,
        config.engine.webhook_workers,
        config.engine.webhook_timeout,
    ));
    let engine_config = config.engine.clone();
    let access_log = config.access_log;
    let srv = HttpServer::new(move || {
        let db = db.clone();
        let gateway = gateway.clone();
        let engine_config = engine_config.clone();
        let producers = producers.clone();
        let dispatcher = dispatcher.clone();
        App::new()
            .wrap(Condition::new(
                access_log,
                Logger::new("%t (%D ms) %s %a %{Host}i %r").log_target("opy::access_log"),
            ))
            .configure(move |cfg| configure_app(cfg, db, gateway, &engine_config, producers, dispatcher))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers the lifecycle APIs and every route on an app. The webhook dispatcher is passed in already wrapped, so
/// that all workers share its concurrency limit.
pub fn configure_app<B, G>(
    cfg: &mut web::ServiceConfig,
    db: B,
    gateway: G,
    config: &EngineConfig,
    producers: EventProducers,
    dispatcher: web::Data<WebhookDispatcher<B, G>>,
) where
    B: LifecycleDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let orders_api = OrderStore::new(db.clone(), config.clone(), producers.clone());
    let payments_api = PaymentCoordinator::new(db.clone(), gateway.clone(), config.clone(), producers.clone());
    let refunds_api = RefundCoordinator::new(db, gateway, config.clone(), producers);
    cfg.app_data(web::Data::new(orders_api))
        .app_data(web::Data::new(payments_api))
        .app_data(web::Data::new(refunds_api))
        .app_data(dispatcher)
        .app_data(
            web::JsonConfig::default()
                .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| ServerError::InvalidRequestPath(err.to_string()).into()),
        )
        .service(health)
        .service(CreateOrderRoute::<B>::new())
        .service(GetOrderRoute::<B>::new())
        .service(OrderHistoryRoute::<B>::new())
        .service(CancelOrderRoute::<B>::new())
        .service(ShipOrderRoute::<B>::new())
        .service(DeliverOrderRoute::<B>::new())
        .service(OrdersForUserRoute::<B>::new())
        .service(OrderStatsRoute::<B>::new())
        .service(CreatePaymentRoute::<B, G>::new())
        .service(GetPaymentRoute::<B, G>::new())
        .service(ConfirmPaymentRoute::<B, G>::new())
        .service(CancelPaymentRoute::<B, G>::new())
        .service(PaymentsForUserRoute::<B, G>::new())
        .service(CreateRefundRoute::<B, G>::new())
        .service(GetRefundRoute::<B, G>::new())
        .service(CancelRefundRoute::<B, G>::new())
        .service(RefundsForUserRoute::<B, G>::new())
        .service(RefundStatsRoute::<B, G>::new())
        .service(GatewayWebhookRoute::<B, G>::new());
}

/// Writes an audit trail of completed payments, annulled orders and settled refunds to the `opy::audit` log target.
pub fn create_audit_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        Box::pin(async move {
            info!(
                target: "opy::audit",
                "📦️ Order {} paid: {} {} (authorization {})",
                ev.order.id, ev.order.amount, ev.order.currency, ev.authorization.id
            );
        })
    });
    hooks.on_order_annulled(|ev| {
        let OrderAnnulledEvent { order, status } = ev;
        Box::pin(async move {
            info!(target: "opy::audit", "📦️ Order {} annulled. Reason: {status}", order.id);
        })
    });
    hooks.on_refund_settled(|ev| {
        Box::pin(async move {
            info!(
                target: "opy::audit",
                "💸️ Refund {} of {} against {} settled as {}",
                ev.refund.id, ev.refund.amount, ev.refund.authorization_id, ev.refund.status
            );
        })
    });
    EventHandlers::new(AUDIT_EVENT_BUFFER_SIZE, hooks)
}
