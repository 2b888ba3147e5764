use serde::{Deserialize, Serialize};

use crate::db_types::{Authorization, Order, OrderStatusType, Refund};

/// An order's authorization succeeded and the order is now `Paid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub authorization: Authorization,
}

impl OrderPaidEvent {
    pub fn new(order: Order, authorization: Authorization) -> Self {
        Self { order, authorization }
    }
}

/// An order reached `Cancelled`, `Failed` or `Refunded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// A refund reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSettledEvent {
    pub refund: Refund,
}

impl RefundSettledEvent {
    pub fn new(refund: Refund) -> Self {
        Self { refund }
    }
}
