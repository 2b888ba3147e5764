use std::collections::BTreeMap;

use log::{debug, trace};
use orderpay_common::MinorUnits;
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        NewOrder,
        Order,
        OrderId,
        OrderStatusChange,
        OrderStatusType,
        OrderTransition,
        Page,
        Pagination,
        UserRole,
    },
    traits::{LifecycleError, OrderStats},
};

/// Takes the database write lock for the order row. This must be the first statement of any transaction that reads
/// an order and then modifies it, so that concurrent writers queue up on the busy timeout rather than failing to
/// upgrade a read lock.
///
/// Returns `false` if the order does not exist.
pub async fn lock_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, LifecycleError> {
    let result = sqlx::query("UPDATE orders SET updated_at = updated_at WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Inserts a new order. This is not atomic on its own; embed it in a transaction if required.
pub async fn insert_order(id: OrderId, order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LifecycleError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (id, buyer_id, seller_id, product_id, amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&id)
    .bind(order.buyer_id)
    .bind(order.seller_id)
    .bind(order.product_id)
    .bind(order.amount)
    .bind(order.currency)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if super::is_unique_violation(&e) {
            LifecycleError::ValidationError(format!("Order {id} already exists"))
        } else {
            e.into()
        }
    })?;
    debug!("🗃️ Order {} has been saved in the DB", order.id);
    Ok(order)
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, LifecycleError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Applies a versioned status transition. The caller is responsible for running this inside a transaction; the order
/// row lock is taken here, so it must be the first write in that transaction unless the caller already holds it.
pub async fn transition_order(
    transition: OrderTransition,
    conn: &mut SqliteConnection,
) -> Result<Order, LifecycleError> {
    let OrderTransition { order_id, expected_version, new_status, authorization_id } = transition;
    if !lock_order(&order_id, conn).await? {
        return Err(LifecycleError::OrderNotFound(order_id));
    }
    let current = fetch_order(&order_id, conn).await?.ok_or_else(|| LifecycleError::OrderNotFound(order_id.clone()))?;
    if current.version != expected_version {
        trace!(
            "🗃️ Version conflict on order {order_id}. Expected {expected_version}, found {}",
            current.version
        );
        return Err(LifecycleError::order_conflict(&order_id, expected_version, current.version));
    }
    if !current.status.can_transition_to(new_status) {
        return Err(LifecycleError::InvalidTransition(format!(
            "Order {order_id} cannot move from {} to {new_status}",
            current.status
        )));
    }
    let updated = sqlx::query_as::<_, Order>(
        r#"
            UPDATE orders SET
                status = $1,
                authorization_id = COALESCE($2, authorization_id),
                version = version + 1,
                updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
            WHERE id = $3 AND version = $4
            RETURNING *;
        "#,
    )
    .bind(new_status)
    .bind(authorization_id)
    .bind(&order_id)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| LifecycleError::order_conflict(&order_id, expected_version, current.version))?;
    sqlx::query(
        "INSERT INTO order_status_changes (order_id, version, old_status, new_status) VALUES ($1, $2, $3, $4)",
    )
    .bind(&order_id)
    .bind(updated.version)
    .bind(current.status)
    .bind(new_status)
    .execute(conn)
    .await?;
    debug!("🗃️ Order {order_id} moved from {} to {new_status} (v{})", current.status, updated.version);
    Ok(updated)
}

pub async fn fetch_orders_for_user(
    user_id: &str,
    role: UserRole,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Page<Order>, LifecycleError> {
    let column = match role {
        UserRole::Buyer => "buyer_id",
        UserRole::Seller => "seller_id",
    };
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {column} = $1"))
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT * FROM orders WHERE {column} = $1 ORDER BY created_at DESC, rowid DESC LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(i64::from(pagination.limit))
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    Ok(Page::new(orders, pagination, total))
}

pub async fn order_stats_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<OrderStats, LifecycleError> {
    let rows: Vec<(OrderStatusType, i64, i64)> = sqlx::query_as(
        r#"
            SELECT status, COUNT(*), COALESCE(SUM(amount), 0)
            FROM orders
            WHERE buyer_id = $1 OR seller_id = $1
            GROUP BY status;
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    let mut counts = BTreeMap::new();
    let mut total_orders = 0;
    let mut total_captured = MinorUnits::default();
    for (status, count, sum) in rows {
        total_orders += count;
        if status.is_captured() {
            total_captured = total_captured + MinorUnits::from(sum);
        }
        counts.insert(status, count);
    }
    Ok(OrderStats { user_id: user_id.to_string(), total_orders, counts, total_captured })
}

pub async fn fetch_order_history(
    id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusChange>, LifecycleError> {
    let history = sqlx::query_as::<_, OrderStatusChange>(
        r#"
            SELECT order_id, version, old_status, new_status, changed_at
            FROM order_status_changes
            WHERE order_id = $1
            ORDER BY version ASC;
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(history)
}
