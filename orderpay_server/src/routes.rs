//! Request handler definitions
//!
//! Define each route and its handler here. Handlers only translate between HTTP and the engine's APIs; any lifecycle
//! rule belongs in `orderpay_engine`. Keep this module neat and tidy 🙏
//!
//! Every handler is async and all I/O (database and gateway calls) is awaited, so a slow gateway never blocks an
//! actix worker thread.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use orderpay_engine::{
    db_types::OrderId,
    traits::{LifecycleDatabase, PaymentGateway},
    OrderStore,
    PaymentCoordinator,
    RefundCoordinator,
    WebhookDispatcher,
};
use serde_json::json;

use crate::{
    data_objects::{
        ApiResponse,
        ConfirmPaymentRequest,
        NewOrderRequest,
        NewPaymentRequest,
        NewPaymentResponse,
        NewRefundRequest,
        OrderListParams,
        PageParams,
        VersionParams,
    },
    errors::ServerError,
};

/// The header carrying the gateway's HMAC signature of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

fn ok_json<T: serde::Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(data))
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl LifecycleDatabase);
pub async fn create_order<B: LifecycleDatabase>(
    api: web::Data<OrderStore<B>>,
    body: web::Json<NewOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    debug!("💻️ New order request from {} for product {}", req.buyer_id, req.product_id);
    let order = api.create_order(&req.buyer_id, &req.seller_id, &req.product_id, req.amount, &req.currency).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(order)))
}

route!(get_order => Get "/orders/{id}" impl LifecycleDatabase);
pub async fn get_order<B: LifecycleDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET order {order_id}");
    let order = api.get(&order_id).await?;
    Ok(ok_json(order))
}

route!(order_history => Get "/orders/{id}/history" impl LifecycleDatabase);
pub async fn order_history<B: LifecycleDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET history for order {order_id}");
    let history = api.history(&order_id).await?;
    Ok(ok_json(history))
}

route!(cancel_order => Post "/orders/{id}/cancel" impl LifecycleDatabase);
pub async fn cancel_order<B: LifecycleDatabase>(
    path: web::Path<String>,
    body: web::Json<VersionParams>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    info!("💻️ Cancellation requested for order {order_id}");
    let order = api.cancel_order(&order_id, body.expected_version).await?;
    Ok(ok_json(order))
}

route!(ship_order => Post "/orders/{id}/ship" impl LifecycleDatabase);
pub async fn ship_order<B: LifecycleDatabase>(
    path: web::Path<String>,
    body: web::Json<VersionParams>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let order = api.mark_shipped(&order_id, body.expected_version).await?;
    Ok(ok_json(order))
}

route!(deliver_order => Post "/orders/{id}/deliver" impl LifecycleDatabase);
pub async fn deliver_order<B: LifecycleDatabase>(
    path: web::Path<String>,
    body: web::Json<VersionParams>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let order = api.mark_delivered(&order_id, body.expected_version).await?;
    Ok(ok_json(order))
}

route!(orders_for_user => Get "/users/{user_id}/orders" impl LifecycleDatabase);
pub async fn orders_for_user<B: LifecycleDatabase>(
    path: web::Path<String>,
    query: web::Query<OrderListParams>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let role = query.role();
    trace!("💻️ GET orders for {role} {user_id}");
    let orders = api.list_by_user(&user_id, role, query.pagination()).await?;
    Ok(ok_json(orders))
}

route!(order_stats => Get "/users/{user_id}/order_stats" impl LifecycleDatabase);
pub async fn order_stats<B: LifecycleDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderStore<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let stats = api.stats_by_user(&user_id).await?;
    Ok(ok_json(stats))
}

// ----------------------------------------------   Payments  ----------------------------------------------------
route!(create_payment => Post "/payments" impl LifecycleDatabase, PaymentGateway);
pub async fn create_payment<B: LifecycleDatabase, G: PaymentGateway>(
    body: web::Json<NewPaymentRequest>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    info!("💻️ Payment of {} {} requested for order {}", req.amount, req.currency, req.order_id);
    let auth = api.create_authorization(req.amount, &req.currency, &req.order_id, req.metadata).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(NewPaymentResponse::from(auth))))
}

route!(get_payment => Get "/payments/{id}" impl LifecycleDatabase, PaymentGateway);
pub async fn get_payment<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let auth_id = path.into_inner();
    trace!("💻️ GET payment {auth_id}");
    let auth = api.get_authorization(&auth_id).await?;
    Ok(ok_json(auth))
}

route!(confirm_payment => Post "/payments/{id}/confirm" impl LifecycleDatabase, PaymentGateway);
pub async fn confirm_payment<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    body: Option<web::Json<ConfirmPaymentRequest>>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let auth_id = path.into_inner();
    let req = body.map(|b| b.into_inner()).unwrap_or_default();
    info!("💻️ Confirmation requested for payment {auth_id}");
    let auth = api.confirm_authorization(&auth_id, req.client_secret.as_deref()).await?;
    Ok(ok_json(auth))
}

route!(cancel_payment => Post "/payments/{id}/cancel" impl LifecycleDatabase, PaymentGateway);
pub async fn cancel_payment<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let auth_id = path.into_inner();
    info!("💻️ Cancellation requested for payment {auth_id}");
    let auth = api.cancel_authorization(&auth_id).await?;
    Ok(ok_json(auth))
}

route!(payments_for_user => Get "/users/{user_id}/payments" impl LifecycleDatabase, PaymentGateway);
pub async fn payments_for_user<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    query: web::Query<PageParams>,
    api: web::Data<PaymentCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let history = api.payment_history(&user_id, query.into_inner().into()).await?;
    Ok(ok_json(history))
}

// ----------------------------------------------   Refunds  ----------------------------------------------------
route!(create_refund => Post "/refunds" impl LifecycleDatabase, PaymentGateway);
pub async fn create_refund<B: LifecycleDatabase, G: PaymentGateway>(
    body: web::Json<NewRefundRequest>,
    api: web::Data<RefundCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    info!("💻️ Refund requested against payment {}", req.authorization_id);
    let refund = api.create_refund(&req.authorization_id, req.amount, &req.reason).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(refund)))
}

route!(get_refund => Get "/refunds/{id}" impl LifecycleDatabase, PaymentGateway);
pub async fn get_refund<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<RefundCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund = api.get_refund(&path.into_inner()).await?;
    Ok(ok_json(refund))
}

route!(cancel_refund => Post "/refunds/{id}/cancel" impl LifecycleDatabase, PaymentGateway);
pub async fn cancel_refund<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<RefundCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    info!("💻️ Cancellation requested for refund {refund_id}");
    let refund = api.cancel_refund(&refund_id).await?;
    Ok(ok_json(refund))
}

route!(refunds_for_user => Get "/users/{user_id}/refunds" impl LifecycleDatabase, PaymentGateway);
pub async fn refunds_for_user<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    query: web::Query<PageParams>,
    api: web::Data<RefundCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refunds = api.refunds_by_user(&path.into_inner(), query.into_inner().into()).await?;
    Ok(ok_json(refunds))
}

route!(refund_stats => Get "/users/{user_id}/refund_stats" impl LifecycleDatabase, PaymentGateway);
pub async fn refund_stats<B: LifecycleDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<RefundCoordinator<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let stats = api.refund_stats(&path.into_inner()).await?;
    Ok(ok_json(stats))
}

// ----------------------------------------------   Webhook  ----------------------------------------------------
route!(gateway_webhook => Post "/webhook" impl LifecycleDatabase, PaymentGateway);
/// The body is taken as raw bytes: the signature covers the exact payload the gateway sent.
pub async fn gateway_webhook<B: LifecycleDatabase, G: PaymentGateway>(
    req: HttpRequest,
    body: web::Bytes,
    dispatcher: web::Data<WebhookDispatcher<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    trace!("💻️ Received webhook delivery ({} bytes)", body.len());
    let ack = dispatcher.dispatch(&body, signature).await?;
    debug!("💻️ Webhook delivery acknowledged: {ack}");
    Ok(ok_json(json!({ "ack": ack })))
}
