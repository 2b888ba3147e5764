use std::collections::BTreeMap;

use cucumber::{given, then, when};
use orderpay_common::MinorUnits;
use orderpay_engine::{
    db_types::{AuthorizationStatus, OrderStatusType, RefundStatus},
    traits::{LifecycleError, RefundManagement},
    Ack,
    EventKind,
};

use crate::cucumber::LifecycleWorld;

fn error_name(e: &LifecycleError) -> &'static str {
    match e {
        LifecycleError::ValidationError(_) => "ValidationError",
        LifecycleError::InvalidTransition(_) => "InvalidTransition",
        LifecycleError::VersionConflict { .. } => "VersionConflict",
        LifecycleError::SignatureVerificationError => "SignatureVerificationError",
        LifecycleError::GatewayUnavailable(_) => "GatewayUnavailable",
        LifecycleError::RefundExceedsCapturedAmount { .. } => "RefundExceedsCapturedAmount",
        LifecycleError::OrderNotFound(_) => "OrderNotFound",
        LifecycleError::AuthorizationNotFound(_) => "AuthorizationNotFound",
        LifecycleError::RefundNotFound(_) => "RefundNotFound",
        LifecycleError::DuplicateEvent(_) => "DuplicateEvent",
        LifecycleError::Timeout(_) => "Timeout",
        LifecycleError::DatabaseError(_) => "DatabaseError",
    }
}

#[given(expr = "the gateway confirms payments as {word}")]
async fn gateway_confirm_outcome(world: &mut LifecycleWorld, status: String) {
    let status = status.parse::<AuthorizationStatus>().expect("Not an authorization status");
    world.system().gateway.set_confirm_outcome(status);
}

#[given(expr = "the gateway settles refunds as {word}")]
async fn gateway_refund_outcome(world: &mut LifecycleWorld, status: String) {
    let status = status.parse::<RefundStatus>().expect("Not a refund status");
    world.system().gateway.set_refund_outcome(status);
}

#[when(expr = "'{word}' orders {word} from '{word}' for {int} {word} as [{word}]")]
async fn place_order(
    world: &mut LifecycleWorld,
    buyer: String,
    product: String,
    seller: String,
    amount: i64,
    currency: String,
    alias: String,
) {
    let order = world
        .system()
        .orders
        .create_order(&buyer, &seller, &product, MinorUnits::from(amount), &currency)
        .await
        .expect("Error creating order");
    world.orders.insert(alias, order.id);
}

#[when(expr = "I authorize a payment of {int} {word} for order [{word}]")]
async fn authorize(world: &mut LifecycleWorld, amount: i64, currency: String, alias: String) {
    let id = world.order_id(&alias);
    let result = world
        .system()
        .payments
        .create_authorization(MinorUnits::from(amount), &currency, &id, BTreeMap::new())
        .await;
    world.record(result);
}

#[when(expr = "the customer confirms the payment for order [{word}]")]
async fn confirm(world: &mut LifecycleWorld, alias: String) {
    let auth_id = world.authorization_id(&alias).await;
    let result = world.system().payments.confirm_authorization(&auth_id, None).await;
    world.record(result);
}

#[when(expr = "I cancel the payment for order [{word}]")]
async fn cancel_payment(world: &mut LifecycleWorld, alias: String) {
    let auth_id = world.authorization_id(&alias).await;
    let result = world.system().payments.cancel_authorization(&auth_id).await;
    world.record(result);
}

#[when(expr = "I refund {int} of the payment for order [{word}]")]
async fn refund(world: &mut LifecycleWorld, amount: i64, alias: String) {
    let auth_id = world.authorization_id(&alias).await;
    let result = world.system().refunds.create_refund(&auth_id, Some(MinorUnits::from(amount)), "requested").await;
    world.record(result);
}

#[when(expr = "the gateway delivers event [{word}] {word} for the payment of order [{word}]")]
async fn deliver_event(world: &mut LifecycleWorld, event_id: String, event_type: String, alias: String) {
    let kind = event_type.parse::<EventKind>().expect("Not a gateway event type");
    let auth_id = world.authorization_id(&alias).await;
    let (payload, signature) = world.system().gateway.webhook(&event_id, kind, &auth_id);
    let result = world.system().webhooks.dispatch(&payload, &signature).await;
    world.last_ack = result.as_ref().ok().copied();
    world.record(result);
}

#[when(expr = "the customer reads order [{word}]")]
async fn snapshot_order(world: &mut LifecycleWorld, alias: String) {
    let order = world.order(&alias).await;
    world.snapshots.insert(alias, order);
}

#[when(expr = "the customer cancels order [{word}] as they last saw it")]
async fn cancel_stale(world: &mut LifecycleWorld, alias: String) {
    let snapshot = world.snapshots.get(&alias).cloned().expect("The customer never read this order");
    let result = world.system().orders.cancel_order(&snapshot.id, snapshot.version).await;
    world.record(result);
}

#[then(expr = "order [{word}] has status {word}")]
async fn check_order_status(world: &mut LifecycleWorld, alias: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    assert_eq!(world.order(&alias).await.status, expected, "Order status is incorrect");
}

#[then(expr = "the payment for order [{word}] has status {word}")]
async fn check_payment_status(world: &mut LifecycleWorld, alias: String, status: String) {
    let expected = status.parse::<AuthorizationStatus>().expect("Not an authorization status");
    let auth_id = world.authorization_id(&alias).await;
    let auth = world.system().payments.fetch_authorization(&auth_id).await.expect("Error fetching authorization");
    assert_eq!(auth.status, expected, "Authorization status is incorrect");
}

#[then(expr = "order [{word}] was marked {word} exactly once")]
async fn check_single_transition(world: &mut LifecycleWorld, alias: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let id = world.order_id(&alias);
    let history = world.system().orders.history(&id).await.expect("Error fetching history");
    let count = history.iter().filter(|c| c.new_status == expected).count();
    assert_eq!(count, 1, "Expected a single transition to {expected}, found {count}");
}

#[then("the request succeeds")]
async fn check_success(world: &mut LifecycleWorld) {
    match world.last_result.as_ref().expect("No request was made") {
        Ok(()) => {},
        Err(e) => panic!("Expected success, but the request failed with {e}"),
    }
}

#[then(expr = "the request fails with {word}")]
async fn check_failure(world: &mut LifecycleWorld, expected: String) {
    match world.last_result.as_ref().expect("No request was made") {
        Ok(()) => panic!("Expected {expected}, but the request succeeded"),
        Err(e) => assert_eq!(error_name(e), expected, "Unexpected error: {e}"),
    }
}

#[then(expr = "the gateway is acknowledged with {word}")]
async fn check_ack(world: &mut LifecycleWorld, expected: String) {
    let ack = world.last_ack.expect("The last delivery was not acknowledged");
    assert_eq!(ack.to_string(), expected);
}

#[then(expr = "the remaining refundable amount for order [{word}] is {int}")]
async fn check_remaining(world: &mut LifecycleWorld, alias: String, amount: i64) {
    let auth_id = world.authorization_id(&alias).await;
    let totals = world.system().db.refund_totals(&auth_id).await.expect("Error fetching refund totals");
    assert_eq!(totals.remaining(), MinorUnits::from(amount), "Remaining refundable amount is incorrect");
}

#[then(expr = "order [{word}] moved on by one version since the customer read it")]
async fn check_single_version_step(world: &mut LifecycleWorld, alias: String) {
    let snapshot = world.snapshots.get(&alias).cloned().expect("The customer never read this order");
    let current = world.order(&alias).await;
    assert_eq!(current.version, snapshot.version + 1, "Exactly one transition was expected since the snapshot");
}
