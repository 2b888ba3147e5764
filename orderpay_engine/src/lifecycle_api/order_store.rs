use std::fmt::Debug;

use log::*;
use orderpay_common::MinorUnits;

use crate::{
    config::EngineConfig,
    db_types::{NewOrder, Order, OrderId, OrderStatusChange, OrderStatusType, OrderTransition, Page, Pagination, UserRole},
    events::EventProducers,
    traits::{LifecycleError, OrderManagement, OrderStats},
};

/// `OrderStore` owns the order records. Every status change, whether requested by a user or cascaded from a payment
/// or refund, goes through [`OrderStore::transition`] or the equivalent backend call, and is checked against the
/// transition table and the order's version.
pub struct OrderStore<B> {
    db: B,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B> Debug for OrderStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderStore")
    }
}

impl<B> OrderStore<B> {
    pub fn new(db: B, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderStore<B>
where B: OrderManagement
{
    /// Creates a new `Pending` order at version 1.
    ///
    /// Fails with `ValidationError` if the amount is not positive, any of the ids are blank, or the currency is not a
    /// supported 3-letter code. The currency is stored in upper case.
    pub async fn create_order(
        &self,
        buyer_id: &str,
        seller_id: &str,
        product_id: &str,
        amount: MinorUnits,
        currency: &str,
    ) -> Result<Order, LifecycleError> {
        if !amount.is_positive() {
            return Err(LifecycleError::ValidationError(format!("Order amount must be positive, not {amount}")));
        }
        for (name, value) in [("buyer_id", buyer_id), ("seller_id", seller_id), ("product_id", product_id)] {
            if value.trim().is_empty() {
                return Err(LifecycleError::ValidationError(format!("{name} cannot be empty")));
            }
        }
        let currency = self.config.validate_currency(currency)?;
        let new_order = NewOrder::new(buyer_id, seller_id, product_id, amount, &currency);
        let order = self.db.insert_order(OrderId::random(), new_order).await?;
        info!("🔄️📦️ Order {} created for buyer {buyer_id}: {amount} {currency}", order.id);
        Ok(order)
    }

    /// Moves the order to `new_status`, provided the stored version is still `expected_version`.
    pub async fn transition(&self, transition: OrderTransition) -> Result<Order, LifecycleError> {
        let order = self.db.transition_order(transition).await?;
        self.producers.publish_order_change(&order, None).await;
        Ok(order)
    }

    pub async fn get(&self, id: &OrderId) -> Result<Order, LifecycleError> {
        self.db.fetch_order(id).await?.ok_or_else(|| LifecycleError::OrderNotFound(id.clone()))
    }

    pub async fn list_by_user(
        &self,
        user_id: &str,
        role: UserRole,
        pagination: Pagination,
    ) -> Result<Page<Order>, LifecycleError> {
        self.db.fetch_orders_for_user(user_id, role, pagination).await
    }

    pub async fn stats_by_user(&self, user_id: &str) -> Result<OrderStats, LifecycleError> {
        self.db.order_stats_for_user(user_id).await
    }

    /// The order's status changes, oldest first.
    pub async fn history(&self, id: &OrderId) -> Result<Vec<OrderStatusChange>, LifecycleError> {
        // Distinguish "no changes yet" from "no such order"
        self.get(id).await?;
        self.db.fetch_order_history(id).await
    }

    /// Cancels the order. This does not touch the gateway; an open authorization should be cancelled through the
    /// payment coordinator, and captured funds refunded.
    pub async fn cancel_order(&self, id: &OrderId, expected_version: i64) -> Result<Order, LifecycleError> {
        self.transition(OrderTransition::new(id.clone(), expected_version, OrderStatusType::Cancelled)).await
    }

    pub async fn mark_shipped(&self, id: &OrderId, expected_version: i64) -> Result<Order, LifecycleError> {
        self.transition(OrderTransition::new(id.clone(), expected_version, OrderStatusType::Shipped)).await
    }

    pub async fn mark_delivered(&self, id: &OrderId, expected_version: i64) -> Result<Order, LifecycleError> {
        self.transition(OrderTransition::new(id.clone(), expected_version, OrderStatusType::Delivered)).await
    }
}
