use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Authorization, AuthorizationStatus, NewAuthorization, OrderId, Page, Pagination},
    traits::LifecycleError,
};

/// Takes the write lock on the authorization row. See [`super::orders::lock_order`].
pub async fn lock_authorization(id: &str, conn: &mut SqliteConnection) -> Result<bool, LifecycleError> {
    let result =
        sqlx::query("UPDATE authorizations SET updated_at = updated_at WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_authorization(
    auth: NewAuthorization,
    conn: &mut SqliteConnection,
) -> Result<Authorization, LifecycleError> {
    let order_id = auth.order_id.clone();
    let result = sqlx::query_as::<_, Authorization>(
        r#"
            INSERT INTO authorizations (id, order_id, amount, currency, client_secret, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(auth.id)
    .bind(auth.order_id)
    .bind(auth.amount)
    .bind(auth.currency)
    .bind(auth.client_secret)
    .bind(auth.idempotency_key)
    .fetch_one(conn)
    .await;
    match result {
        Ok(auth) => {
            debug!("🗃️ Authorization {} for order {} has been saved in the DB", auth.id, auth.order_id);
            Ok(auth)
        },
        Err(e) if super::is_unique_violation(&e) => {
            Err(LifecycleError::InvalidTransition(format!("Order {order_id} already has an authorization")))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_authorization(id: &str, conn: &mut SqliteConnection) -> Result<Option<Authorization>, LifecycleError> {
    let auth = sqlx::query_as::<_, Authorization>("SELECT * FROM authorizations WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(auth)
}

pub async fn fetch_authorization_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Authorization>, LifecycleError> {
    let auth = sqlx::query_as::<_, Authorization>("SELECT * FROM authorizations WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(auth)
}

/// Changes the authorization status, provided the stored status is still `expected`.
pub async fn update_status(
    id: &str,
    expected: AuthorizationStatus,
    new_status: AuthorizationStatus,
    conn: &mut SqliteConnection,
) -> Result<Authorization, LifecycleError> {
    if !expected.can_transition_to(new_status) {
        return Err(LifecycleError::InvalidTransition(format!(
            "Authorization {id} cannot move from {expected} to {new_status}"
        )));
    }
    let updated = sqlx::query_as::<_, Authorization>(
        r#"
            UPDATE authorizations SET status = $1, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
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
        Some(auth) => {
            debug!("🗃️ Authorization {id} moved from {expected} to {new_status}");
            Ok(auth)
        },
        None => match fetch_authorization(id, conn).await? {
            Some(current) => Err(LifecycleError::status_conflict(format!("Authorization {id}"), expected, current.status)),
            None => Err(LifecycleError::AuthorizationNotFound(id.to_string())),
        },
    }
}

pub async fn payment_history(
    user_id: &str,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Page<Authorization>, LifecycleError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM authorizations a JOIN orders o ON o.id = a.order_id WHERE o.buyer_id = $1",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    let items = sqlx::query_as::<_, Authorization>(
        r#"
            SELECT a.* FROM authorizations a
            JOIN orders o ON o.id = a.order_id
            WHERE o.buyer_id = $1
            ORDER BY a.created_at DESC, a.rowid DESC
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
