use crate::{
    db_types::{Authorization, AuthorizationUpdate, NewAuthorization, Order, OrderId, OrderTransition, Page, Pagination},
    traits::{AuthorizationUpdateResult, LifecycleError},
};

/// Storage behaviour for gateway authorizations.
#[allow(async_fn_in_trait)]
pub trait PaymentManagement: Clone {
    /// In a single atomic transaction,
    /// * inserts the authorization with status `RequiresConfirmation`,
    /// * applies `order_transition` (normally `Pending` → `Authorizing`, carrying the authorization id).
    ///
    /// An order can only ever have one authorization. A second insert for the same order or idempotency key fails
    /// with `InvalidTransition` and leaves no trace.
    async fn insert_authorization(
        &self,
        authorization: NewAuthorization,
        order_transition: OrderTransition,
    ) -> Result<(Authorization, Order), LifecycleError>;

    async fn fetch_authorization(&self, id: &str) -> Result<Option<Authorization>, LifecycleError>;

    async fn fetch_authorization_for_order(&self, order_id: &OrderId)
        -> Result<Option<Authorization>, LifecycleError>;

    /// In a single atomic transaction,
    /// * changes the authorization status, provided it is still `expected_status` (`VersionConflict` otherwise),
    /// * applies the cascading order transition, if any,
    /// * records the webhook ledger entry, if any (`DuplicateEvent` if it already exists).
    ///
    /// Any failure rolls back all three.
    async fn apply_authorization_update(
        &self,
        update: AuthorizationUpdate,
    ) -> Result<AuthorizationUpdateResult, LifecycleError>;

    /// Authorizations for orders bought by the user, most recent first.
    async fn payment_history(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> Result<Page<Authorization>, LifecycleError>;
}
