use std::collections::BTreeMap;

use futures_util::future::join_all;
use orderpay_common::MinorUnits;
use orderpay_engine::{
    db_types::{AuthorizationStatus, OrderStatusType, OrderTransition, RefundStatus},
    traits::{LifecycleError, PaymentManagement, RefundManagement},
    Ack,
    EventKind,
};

use crate::support::TestSystem;

mod support;

#[tokio::test]
async fn stale_versions_are_rejected() {
    let sys = TestSystem::new().await;
    let (order, _auth) = sys.paid_order(5000).await;
    let shipped = sys.orders.mark_shipped(&order.id, order.version).await.unwrap();
    // A second writer still holding the old version
    let err = sys.orders.cancel_order(&order.id, order.version).await.unwrap_err();
    assert!(matches!(err, LifecycleError::VersionConflict { .. }));
    assert!(err.is_retryable());
    assert_eq!(sys.order(&order.id).await, shipped);
    sys.tear_down().await;
}

#[tokio::test]
async fn racing_transitions_have_one_winner() {
    let sys = TestSystem::new().await;
    for _ in 0..5 {
        let (order, _auth) = sys.paid_order(5000).await;
        let cancel = OrderTransition::for_order(&order, OrderStatusType::Cancelled);
        let ship = OrderTransition::for_order(&order, OrderStatusType::Shipped);
        let (a, b) = tokio::join!(sys.orders.transition(cancel), sys.orders.transition(ship));
        let (winner, loser) = match (a, b) {
            (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
            (a, b) => panic!("Expected exactly one winner, got {a:?} and {b:?}"),
        };
        assert!(matches!(loser, LifecycleError::VersionConflict { .. }));
        assert_eq!(winner.version, order.version + 1);
        let current = sys.order(&order.id).await;
        assert_eq!(current, winner);
        let history = sys.orders.history(&order.id).await.unwrap();
        assert_eq!(history.last().map(|c| c.new_status), Some(winner.status));
        assert_eq!(history.iter().filter(|c| c.version == winner.version).count(), 1);
    }
    sys.tear_down().await;
}

#[tokio::test]
async fn concurrent_refunds_never_exceed_the_capture() {
    let sys = TestSystem::new().await;
    let (order, auth) = sys.paid_order(10_000).await;
    let requests = (0..5).map(|i| {
        let reason = format!("split {i}");
        let refunds = &sys.refunds;
        let auth_id = auth.id.as_str();
        async move { refunds.create_refund(auth_id, Some(MinorUnits::from(3000)), &reason).await }
    });
    let results = join_all(requests).await;
    let succeeded = results.iter().filter(|r| matches!(r, Ok(rf) if rf.status == RefundStatus::Succeeded)).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(LifecycleError::RefundExceedsCapturedAmount { .. })))
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 2);
    let totals = sys.db.refund_totals(&auth.id).await.unwrap();
    assert_eq!(totals.succeeded, MinorUnits::from(9000));
    assert_eq!(totals.remaining(), MinorUnits::from(1000));
    assert_eq!(sys.order(&order.id).await.status, OrderStatusType::Paid);
    sys.tear_down().await;
}

#[tokio::test]
async fn concurrent_authorizations_create_one_gateway_authorization() {
    let sys = TestSystem::new().await;
    let order = sys.pending_order(5000).await;
    let amount = MinorUnits::from(5000);
    let (a, b) = tokio::join!(
        sys.payments.create_authorization(amount, "usd", &order.id, BTreeMap::new()),
        sys.payments.create_authorization(amount, "usd", &order.id, BTreeMap::new()),
    );
    let stored = sys.db.fetch_authorization_for_order(&order.id).await.unwrap().expect("Authorization was not stored");
    for result in [a, b] {
        match result {
            Ok(auth) => assert_eq!(auth.id, stored.id),
            // The loser saw the order already authorizing
            Err(e) => assert!(matches!(e, LifecycleError::InvalidTransition(_)), "Unexpected error {e:?}"),
        }
    }
    assert_eq!(sys.gateway.authorization_count(), 1);
    let order = sys.order(&order.id).await;
    assert_eq!(order.status, OrderStatusType::Authorizing);
    assert_eq!(order.authorization_id, Some(stored.id));
    sys.tear_down().await;
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_apply_once() {
    let sys = TestSystem::new().await;
    let (order, auth) = sys.authorizing_order(5000).await;
    let (payload, signature) =
        sys.gateway.webhook("evt_storm", EventKind::Authorization(AuthorizationStatus::Succeeded), &auth.id);
    let deliveries = (0..4).map(|_| sys.webhooks.dispatch(&payload, &signature));
    let acks = join_all(deliveries).await.into_iter().collect::<Result<Vec<Ack>, _>>().unwrap();
    assert_eq!(acks.iter().filter(|a| **a == Ack::Applied).count(), 1);
    assert_eq!(acks.iter().filter(|a| **a == Ack::Duplicate).count(), 3);
    let order = sys.order(&order.id).await;
    assert_eq!(order.status, OrderStatusType::Paid);
    let history = sys.orders.history(&order.id).await.unwrap();
    assert_eq!(history.iter().filter(|c| c.new_status == OrderStatusType::Paid).count(), 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn confirmation_racing_a_webhook() {
    let sys = TestSystem::new().await;
    let (order, auth) = sys.authorizing_order(5000).await;
    let (confirmed, delivered) = tokio::join!(
        sys.payments.confirm_authorization(&auth.id, None),
        sys.deliver("evt_race", EventKind::Authorization(AuthorizationStatus::Succeeded), &auth.id),
    );
    let confirmed = confirmed.unwrap();
    assert_eq!(confirmed.status, AuthorizationStatus::Succeeded);
    // Whoever loses sees the state already applied, or is asked to redeliver
    match delivered {
        Ok(ack) => assert!(matches!(ack, Ack::Applied | Ack::Discarded)),
        Err(e) => assert!(e.is_retryable(), "Unexpected error {e:?}"),
    }
    let order = sys.order(&order.id).await;
    assert_eq!(order.status, OrderStatusType::Paid);
    let history = sys.orders.history(&order.id).await.unwrap();
    assert_eq!(history.iter().filter(|c| c.new_status == OrderStatusType::Paid).count(), 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn cancellation_racing_a_late_capture() {
    let sys = TestSystem::new().await;
    let succeeded = EventKind::Authorization(AuthorizationStatus::Succeeded);
    for i in 0..5 {
        let (order, auth) = sys.authorizing_order(5000 + i).await;
        let event_id = format!("evt_late_{i}");
        let (cancelled, delivered) =
            tokio::join!(sys.orders.cancel_order(&order.id, order.version), sys.deliver(&event_id, succeeded, &auth.id));
        let current = sys.order(&order.id).await;
        assert_eq!(current.version, order.version + 1);
        match current.status {
            OrderStatusType::Cancelled => {
                assert!(cancelled.is_ok());
                // A capture that lands after the cancellation is recorded on the authorization only
                match delivered {
                    Ok(ack) => {
                        assert_eq!(ack, Ack::Applied);
                        let auth = sys.payments.fetch_authorization(&auth.id).await.unwrap();
                        assert_eq!(auth.status, AuthorizationStatus::Succeeded);
                    },
                    Err(e) => assert!(matches!(e, LifecycleError::VersionConflict { .. }), "Unexpected error {e:?}"),
                }
            },
            OrderStatusType::Paid => {
                assert_eq!(delivered.unwrap(), Ack::Applied);
                assert!(matches!(cancelled, Err(LifecycleError::VersionConflict { .. })));
            },
            other => panic!("Order ended up {other}"),
        }
    }

    // Sequenced: the capture lands first and the stale cancellation loses
    let (order, auth) = sys.authorizing_order(9000).await;
    assert_eq!(sys.deliver("evt_first", succeeded, &auth.id).await.unwrap(), Ack::Applied);
    let err = sys.orders.cancel_order(&order.id, order.version).await.unwrap_err();
    assert!(matches!(err, LifecycleError::VersionConflict { .. }));
    assert_eq!(sys.order(&order.id).await.status, OrderStatusType::Paid);
    sys.tear_down().await;
}
