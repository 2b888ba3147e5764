use std::collections::BTreeMap;

use log::{debug, warn};
use orderpay_common::MinorUnits;
use sqlx::SqliteConnection;

use super::{authorizations, orders};
use crate::{
    db_types::{AuthorizationStatus, NewRefund, Order, OrderStatusType, OrderTransition, Page, Pagination, Refund, RefundStatus},
    traits::{LifecycleError, RefundStats, RefundTotals},
};

pub async fn lock_refund(id: &str, conn: &mut SqliteConnection) -> Result<bool, LifecycleError> {
    let result =
        sqlx::query("UPDATE refunds SET updated_at = updated_at WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Reserves a refund against the authorization. The caller must run this inside a transaction; the authorization
/// row lock taken here serialises concurrent reservations so the ceiling cannot be overshot.
pub async fn reserve_refund(refund: NewRefund, conn: &mut SqliteConnection) -> Result<Refund, LifecycleError> {
    let auth_id = refund.authorization_id.as_str();
    if !authorizations::lock_authorization(auth_id, conn).await? {
        return Err(LifecycleError::AuthorizationNotFound(auth_id.to_string()));
    }
    let auth = authorizations::fetch_authorization(auth_id, conn)
        .await?
        .ok_or_else(|| LifecycleError::AuthorizationNotFound(auth_id.to_string()))?;
    if auth.status != AuthorizationStatus::Succeeded {
        return Err(LifecycleError::InvalidTransition(format!(
            "Authorization {auth_id} is {} and has no captured funds to refund",
            auth.status
        )));
    }
    let remaining = refund_totals(auth_id, conn).await?.remaining();
    let amount = refund.amount.unwrap_or(remaining);
    if !amount.is_positive() && refund.amount.is_some() {
        return Err(LifecycleError::ValidationError(format!("Refund amount must be positive, not {amount}")));
    }
    if !remaining.is_positive() || amount > remaining {
        return Err(LifecycleError::RefundExceedsCapturedAmount { requested: amount, remaining });
    }
    let refund = sqlx::query_as::<_, Refund>(
        r#"
            INSERT INTO refunds (id, authorization_id, amount, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(refund.id)
    .bind(auth_id)
    .bind(amount)
    .bind(refund.reason)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Refund {} of {amount} reserved against authorization {auth_id}", refund.id);
    Ok(refund)
}

pub async fn fetch_refund(id: &str, conn: &mut SqliteConnection) -> Result<Option<Refund>, LifecycleError> {
    let refund = sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_refund_by_gateway_id(
    gateway_refund_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Refund>, LifecycleError> {
    let refund = sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE gateway_refund_id = $1")
        .bind(gateway_refund_id)
        .fetch_optional(conn)
        .await?;
    Ok(refund)
}

pub async fn attach_gateway_refund_id(
    id: &str,
    gateway_refund_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Refund, LifecycleError> {
    let updated = sqlx::query_as::<_, Refund>(
        r#"
            UPDATE refunds SET gateway_refund_id = $1, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
            WHERE id = $2 AND (gateway_refund_id IS NULL OR gateway_refund_id = $1)
            RETURNING *;
        "#,
    )
    .bind(gateway_refund_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(refund) => Ok(refund),
        None => match fetch_refund(id, conn).await? {
            Some(r) => Err(LifecycleError::InvalidTransition(format!(
                "Refund {id} is already linked to gateway refund {}",
                r.gateway_refund_id.unwrap_or_default()
            ))),
            None => Err(LifecycleError::RefundNotFound(id.to_string())),
        },
    }
}

/// Changes the refund status, provided it is still `expected`.
pub async fn update_status(
    id: &str,
    expected: RefundStatus,
    new_status: RefundStatus,
    conn: &mut SqliteConnection,
) -> Result<Refund, LifecycleError> {
    if !expected.can_transition_to(new_status) {
        return Err(LifecycleError::InvalidTransition(format!(
            "Refund {id} cannot move from {expected} to {new_status}"
        )));
    }
    let updated = sqlx::query_as::<_, Refund>(
        r#"
            UPDATE refunds SET status = $1, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
            WHERE id = $2 AND status = $3
            RETURNING *;
        "#,
    )
    .bind(new_status)
    .bind(id)
    .bind(expected)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(refund) => {
            debug!("🗃️ Refund {id} moved from {expected} to {new_status}");
            Ok(refund)
        },
        None => match fetch_refund(id, conn).await? {
            Some(current) => Err(LifecycleError::status_conflict(format!("Refund {id}"), expected, current.status)),
            None => Err(LifecycleError::RefundNotFound(id.to_string())),
        },
    }
}

/// Moves the order that owns `authorization_id` to `Refunded` once the succeeded refunds cover the captured amount.
/// Orders whose current status does not permit it are left alone.
pub async fn settle_order_if_fully_refunded(
    authorization_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LifecycleError> {
    let totals = refund_totals(authorization_id, conn).await?;
    if !totals.is_fully_refunded() {
        return Ok(None);
    }
    let auth = authorizations::fetch_authorization(authorization_id, conn)
        .await?
        .ok_or_else(|| LifecycleError::AuthorizationNotFound(authorization_id.to_string()))?;
    let order =
        orders::fetch_order(&auth.order_id, conn).await?.ok_or_else(|| LifecycleError::OrderNotFound(auth.order_id))?;
    if !order.status.can_transition_to(OrderStatusType::Refunded) {
        warn!(
            "🗃️ Authorization {authorization_id} is fully refunded, but order {} is {} and cannot be marked as \
             refunded. Leaving it alone.",
            order.id, order.status
        );
        return Ok(None);
    }
    let order = orders::transition_order(OrderTransition::for_order(&order, OrderStatusType::Refunded), conn).await?;
    Ok(Some(order))
}

pub async fn refund_totals(authorization_id: &str, conn: &mut SqliteConnection) -> Result<RefundTotals, LifecycleError> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        r#"
            SELECT
                CASE WHEN a.status = 'SUCCEEDED' THEN a.amount ELSE 0 END,
                COALESCE(SUM(CASE WHEN r.status = 'SUCCEEDED' THEN r.amount END), 0),
                COALESCE(SUM(CASE WHEN r.status = 'REQUESTED' THEN r.amount END), 0)
            FROM authorizations a
            LEFT JOIN refunds r ON r.authorization_id = a.id
            WHERE a.id = $1
            GROUP BY a.id;
        "#,
    )
    .bind(authorization_id)
    .fetch_optional(conn)
    .await?;
    let (captured, succeeded, requested) =
        row.ok_or_else(|| LifecycleError::AuthorizationNotFound(authorization_id.to_string()))?;
    Ok(RefundTotals {
        captured: MinorUnits::from(captured),
        succeeded: MinorUnits::from(succeeded),
        requested: MinorUnits::from(requested),
    })
}

pub async fn refunds_for_user(
    user_id: &str,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Page<Refund>, LifecycleError> {
    let total: i64 = sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM refunds r
            JOIN authorizations a ON a.id = r.authorization_id
            JOIN orders o ON o.id = a.order_id
            WHERE o.buyer_id = $1;
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    let items = sqlx::query_as::<_, Refund>(
        r#"
            SELECT r.* FROM refunds r
            JOIN authorizations a ON a.id = r.authorization_id
            JOIN orders o ON o.id = a.order_id
            WHERE o.buyer_id = $1
            ORDER BY r.created_at DESC, r.rowid DESC
            LIMIT $2 OFFSET $3;
        "#,
    )
    .bind(user_id)
    .bind(i64::from(pagination.limit))
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    Ok(Page::new(items, pagination, total))
}

pub async fn refund_stats_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<RefundStats, LifecycleError> {
    let rows: Vec<(RefundStatus, i64, i64)> = sqlx::query_as(
        r#"
            SELECT r.status, COUNT(*), COALESCE(SUM(r.amount), 0)
            FROM refunds r
            JOIN authorizations a ON a.id = r.authorization_id
            JOIN orders o ON o.id = a.order_id
            WHERE o.buyer_id = $1
            GROUP BY r.status;
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    let mut stats = RefundStats {
        user_id: user_id.to_string(),
        total_refunds: 0,
        counts: BTreeMap::new(),
        total_refunded: MinorUnits::default(),
        total_pending: MinorUnits::default(),
    };
    for (status, count, sum) in rows {
        stats.total_refunds += count;
        match status {
            RefundStatus::Succeeded => stats.total_refunded = MinorUnits::from(sum),
            RefundStatus::Requested => stats.total_pending = MinorUnits::from(sum),
            RefundStatus::Failed | RefundStatus::Cancelled => {},
        }
        stats.counts.insert(status, count);
    }
    Ok(stats)
}
