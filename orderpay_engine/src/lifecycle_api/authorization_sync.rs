//! Applying authorization status changes, shared by the payment coordinator (synchronous gateway results) and the
//! webhook reconciler (asynchronous results).
use log::*;

use crate::{
    db_types::{Authorization, AuthorizationStatus, OrderStatusType, OrderTransition},
    traits::{LifecycleError, OrderManagement},
};

/// Works out the order transition implied by moving `auth` to `status`, based on the order as it is now.
///
/// The authorization itself always follows the gateway. When the order has already left `Authorizing` it keeps its
/// status: the first terminal state stays final. A capture on such an order leaves funds that must be refunded, which
/// is logged at warn level.
pub(crate) async fn order_cascade<B: OrderManagement>(
    db: &B,
    auth: &Authorization,
    status: AuthorizationStatus,
) -> Result<Option<OrderTransition>, LifecycleError> {
    let Some(target) = status.order_status() else {
        return Ok(None);
    };
    let order =
        db.fetch_order(&auth.order_id).await?.ok_or_else(|| LifecycleError::OrderNotFound(auth.order_id.clone()))?;
    if order.status.can_transition_to(target) {
        return Ok(Some(OrderTransition::for_order(&order, target)));
    }
    if target == OrderStatusType::Paid {
        warn!(
            "🔄️💳️ Authorization {} succeeded, but order {} is already {}. The captured funds must be refunded.",
            auth.id, order.id, order.status
        );
    } else {
        debug!(
            "🔄️💳️ Order {} is {}, so authorization {} moving to {status} does not change it",
            order.id, order.status, auth.id
        );
    }
    Ok(None)
}
