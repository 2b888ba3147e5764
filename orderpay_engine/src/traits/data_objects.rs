use std::collections::BTreeMap;

use orderpay_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::db_types::{Authorization, Order, OrderStatusType, Refund, RefundStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub user_id: String,
    pub total_orders: i64,
    pub counts: BTreeMap<OrderStatusType, i64>,
    /// Sum of the amounts of orders that are paid, shipped or delivered
    pub total_captured: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundStats {
    pub user_id: String,
    pub total_refunds: i64,
    pub counts: BTreeMap<RefundStatus, i64>,
    pub total_refunded: MinorUnits,
    pub total_pending: MinorUnits,
}

/// Refund sums for a single authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTotals {
    pub captured: MinorUnits,
    pub succeeded: MinorUnits,
    pub requested: MinorUnits,
}

impl RefundTotals {
    /// The amount that can still be refunded. Requested (in-flight) refunds are treated as reserved.
    pub fn remaining(&self) -> MinorUnits {
        self.captured - self.succeeded - self.requested
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.succeeded >= self.captured
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationUpdateResult {
    pub authorization: Authorization,
    /// Present when the update cascaded into an order transition
    pub order: Option<Order>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundUpdateResult {
    pub refund: Refund,
    /// Present when the refund settled the full captured amount and the order moved to `Refunded`
    pub order: Option<Order>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeResult {
    pub webhook_events: u64,
    pub idempotency_records: u64,
}

impl PurgeResult {
    pub fn total_count(&self) -> u64 {
        self.webhook_events + self.idempotency_records
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remaining_counts_requested_refunds_as_reserved() {
        let totals = RefundTotals {
            captured: MinorUnits::from(10_000),
            succeeded: MinorUnits::from(6_000),
            requested: MinorUnits::from(1_000),
        };
        assert_eq!(totals.remaining(), MinorUnits::from(3_000));
        assert!(!totals.is_fully_refunded());
    }
}
