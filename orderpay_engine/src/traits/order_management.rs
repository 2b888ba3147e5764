use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusChange, OrderTransition, Page, Pagination, UserRole},
    traits::{LifecycleError, OrderStats},
};

/// The `OrderManagement` trait defines the behaviour that a database backend must provide for storing orders.
///
/// [`OrderManagement::transition_order`] is the only path that mutates an order after it has been inserted. Backends
/// must enforce the transition table ([`crate::db_types::OrderStatusType::can_transition_to`]) and the optimistic
/// version check inside it.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order with status `Pending` and version 1. The `NewOrder` must already be validated.
    async fn insert_order(&self, id: OrderId, order: NewOrder) -> Result<Order, LifecycleError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, LifecycleError>;

    /// In a single atomic transaction:
    /// * checks that the stored version equals `expected_version`, failing with `VersionConflict` otherwise,
    /// * checks that the status change is permitted, failing with `InvalidTransition` otherwise,
    /// * updates the status (and authorization id, if given), and increments the version,
    /// * appends an entry to the order's status history.
    ///
    /// Returns the updated order.
    async fn transition_order(&self, transition: OrderTransition) -> Result<Order, LifecycleError>;

    /// Orders where the user has the given role, most recent first.
    async fn fetch_orders_for_user(
        &self,
        user_id: &str,
        role: UserRole,
        pagination: Pagination,
    ) -> Result<Page<Order>, LifecycleError>;

    /// Aggregates over all orders where the user is either the buyer or the seller.
    async fn order_stats_for_user(&self, user_id: &str) -> Result<OrderStats, LifecycleError>;

    /// The status history for the order, oldest first.
    async fn fetch_order_history(&self, id: &OrderId) -> Result<Vec<OrderStatusChange>, LifecycleError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LifecycleError> {
        Ok(())
    }
}
