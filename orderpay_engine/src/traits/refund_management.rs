use crate::{
    db_types::{NewRefund, Page, Pagination, Refund, RefundUpdate},
    traits::{LifecycleError, RefundStats, RefundTotals, RefundUpdateResult},
};

/// Storage behaviour for refunds.
#[allow(async_fn_in_trait)]
pub trait RefundManagement: Clone {
    /// Reserves a refund against an authorization. In a single atomic transaction that holds the authorization's
    /// write lock:
    /// * the authorization must exist and be `Succeeded`,
    /// * the remaining refundable amount is computed (captured - succeeded - requested),
    /// * a missing amount defaults to the remaining amount; an amount above it fails with
    ///   `RefundExceedsCapturedAmount`,
    /// * the refund is inserted with status `Requested`.
    async fn reserve_refund(&self, refund: NewRefund) -> Result<Refund, LifecycleError>;

    async fn fetch_refund(&self, id: &str) -> Result<Option<Refund>, LifecycleError>;

    async fn fetch_refund_by_gateway_id(&self, gateway_refund_id: &str) -> Result<Option<Refund>, LifecycleError>;

    /// Records the gateway's id for a refund. Setting the same id twice is a no-op.
    async fn attach_gateway_refund_id(&self, id: &str, gateway_refund_id: &str) -> Result<Refund, LifecycleError>;

    /// In a single atomic transaction,
    /// * changes the refund status, provided it is still `expected_status` (`VersionConflict` otherwise),
    /// * when the refund succeeded and the authorization is now fully refunded, moves the owning order to
    ///   `Refunded` if its current status permits it,
    /// * records the webhook ledger entry, if any.
    async fn apply_refund_update(&self, update: RefundUpdate) -> Result<RefundUpdateResult, LifecycleError>;

    async fn refund_totals(&self, authorization_id: &str) -> Result<RefundTotals, LifecycleError>;

    /// Refunds for orders bought by the user, most recent first.
    async fn refunds_for_user(&self, user_id: &str, pagination: Pagination) -> Result<Page<Refund>, LifecycleError>;

    async fn refund_stats_for_user(&self, user_id: &str) -> Result<RefundStats, LifecycleError>;
}
