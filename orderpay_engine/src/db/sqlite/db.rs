use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::{authorizations, db_url, idempotency, new_pool, orders, refunds, webhook_events, SqliteDatabaseError};
use crate::{
    db_types::{
        Authorization,
        AuthorizationUpdate,
        IdempotencyRecord,
        NewAuthorization,
        NewOrder,
        NewRefund,
        NewWebhookEvent,
        Order,
        OrderId,
        OrderStatusChange,
        OrderTransition,
        Page,
        Pagination,
        Refund,
        RefundStatus,
        RefundUpdate,
        UserRole,
        WebhookEvent,
    },
    traits::{
        AuthorizationUpdateResult,
        IdempotencyManagement,
        LifecycleError,
        OrderManagement,
        OrderStats,
        PaymentManagement,
        RefundManagement,
        RefundStats,
        RefundTotals,
        RefundUpdateResult,
        WebhookLedger,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the `OPY_DATABASE_URL` environment variable (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Connected to {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    /// Brings the schema up to date using the embedded migrations.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, id: OrderId, order: NewOrder) -> Result<Order, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(id, order, &mut conn).await
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn transition_order(&self, transition: OrderTransition) -> Result<Order, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::transition_order(transition, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_orders_for_user(
        &self,
        user_id: &str,
        role: UserRole,
        pagination: Pagination,
    ) -> Result<Page<Order>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_user(user_id, role, pagination, &mut conn).await
    }

    async fn order_stats_for_user(&self, user_id: &str) -> Result<OrderStats, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        orders::order_stats_for_user(user_id, &mut conn).await
    }

    async fn fetch_order_history(&self, id: &OrderId) -> Result<Vec<OrderStatusChange>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_history(id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LifecycleError> {
        self.pool.close().await;
        Ok(())
    }
}

impl PaymentManagement for SqliteDatabase {
    async fn insert_authorization(
        &self,
        authorization: NewAuthorization,
        order_transition: OrderTransition,
    ) -> Result<(Authorization, Order), LifecycleError> {
        if authorization.order_id != order_transition.order_id {
            return Err(LifecycleError::ValidationError(format!(
                "Authorization {} belongs to order {}, not {}",
                authorization.id, authorization.order_id, order_transition.order_id
            )));
        }
        let mut tx = self.pool.begin().await?;
        // The order transition takes the order row lock, so it goes first
        let order = orders::transition_order(order_transition, &mut tx).await?;
        let auth = authorizations::insert_authorization(authorization, &mut tx).await?;
        tx.commit().await?;
        Ok((auth, order))
    }

    async fn fetch_authorization(&self, id: &str) -> Result<Option<Authorization>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        authorizations::fetch_authorization(id, &mut conn).await
    }

    async fn fetch_authorization_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Authorization>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        authorizations::fetch_authorization_for_order(order_id, &mut conn).await
    }

    async fn apply_authorization_update(
        &self,
        update: AuthorizationUpdate,
    ) -> Result<AuthorizationUpdateResult, LifecycleError> {
        let AuthorizationUpdate { authorization_id, expected_status, new_status, order_transition, ledger_entry } =
            update;
        let mut tx = self.pool.begin().await?;
        if !authorizations::lock_authorization(&authorization_id, &mut tx).await? {
            return Err(LifecycleError::AuthorizationNotFound(authorization_id));
        }
        let authorization =
            authorizations::update_status(&authorization_id, expected_status, new_status, &mut tx).await?;
        let order = match order_transition {
            Some(transition) => Some(orders::transition_order(transition, &mut tx).await?),
            None => None,
        };
        if let Some(entry) = ledger_entry {
            webhook_events::insert_event(entry, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(AuthorizationUpdateResult { authorization, order })
    }

    async fn payment_history(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> Result<Page<Authorization>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        authorizations::payment_history(user_id, pagination, &mut conn).await
    }
}

impl RefundManagement for SqliteDatabase {
    async fn reserve_refund(&self, refund: NewRefund) -> Result<Refund, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let refund = refunds::reserve_refund(refund, &mut tx).await?;
        tx.commit().await?;
        Ok(refund)
    }

    async fn fetch_refund(&self, id: &str) -> Result<Option<Refund>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refund(id, &mut conn).await
    }

    async fn fetch_refund_by_gateway_id(&self, gateway_refund_id: &str) -> Result<Option<Refund>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refund_by_gateway_id(gateway_refund_id, &mut conn).await
    }

    async fn attach_gateway_refund_id(&self, id: &str, gateway_refund_id: &str) -> Result<Refund, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        refunds::attach_gateway_refund_id(id, gateway_refund_id, &mut conn).await
    }

    async fn apply_refund_update(&self, update: RefundUpdate) -> Result<RefundUpdateResult, LifecycleError> {
        let RefundUpdate { refund_id, expected_status, new_status, ledger_entry } = update;
        let mut tx = self.pool.begin().await?;
        if !refunds::lock_refund(&refund_id, &mut tx).await? {
            return Err(LifecycleError::RefundNotFound(refund_id));
        }
        let refund = refunds::update_status(&refund_id, expected_status, new_status, &mut tx).await?;
        let order = if new_status == RefundStatus::Succeeded {
            refunds::settle_order_if_fully_refunded(&refund.authorization_id, &mut tx).await?
        } else {
            None
        };
        if let Some(entry) = ledger_entry {
            webhook_events::insert_event(entry, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(RefundUpdateResult { refund, order })
    }

    async fn refund_totals(&self, authorization_id: &str) -> Result<RefundTotals, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        refunds::refund_totals(authorization_id, &mut conn).await
    }

    async fn refunds_for_user(&self, user_id: &str, pagination: Pagination) -> Result<Page<Refund>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        refunds::refunds_for_user(user_id, pagination, &mut conn).await
    }

    async fn refund_stats_for_user(&self, user_id: &str) -> Result<RefundStats, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        refunds::refund_stats_for_user(user_id, &mut conn).await
    }
}

impl WebhookLedger for SqliteDatabase {
    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::fetch_event(event_id, &mut conn).await
    }

    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<WebhookEvent, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::insert_event(event, &mut conn).await
    }

    async fn purge_webhook_events(&self, cutoff: DateTime<Utc>) -> Result<u64, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        let count = webhook_events::purge_events(cutoff, &mut conn).await?;
        debug!("🗃️ Purged {count} webhook ledger entries older than {cutoff}");
        Ok(count)
    }
}

impl IdempotencyManagement for SqliteDatabase {
    async fn fetch_idempotency_record(
        &self,
        key: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::fetch_record(key, not_before, &mut conn).await
    }

    async fn save_idempotency_record(&self, key: &str, operation: &str, response: &str) -> Result<(), LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::upsert_record(key, operation, response, &mut conn).await
    }

    async fn purge_idempotency_records(&self, cutoff: DateTime<Utc>) -> Result<u64, LifecycleError> {
        let mut conn = self.pool.acquire().await?;
        let count = idempotency::purge_records(cutoff, &mut conn).await?;
        debug!("🗃️ Purged {count} idempotency records older than {cutoff}");
        Ok(count)
    }
}
