use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::db_timestamp;
use crate::{db_types::IdempotencyRecord, traits::LifecycleError};

pub async fn fetch_record(
    key: &str,
    not_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, LifecycleError> {
    let record = sqlx::query_as::<_, IdempotencyRecord>(
        "SELECT * FROM idempotency_records WHERE key = $1 AND created_at >= $2",
    )
    .bind(key)
    .bind(db_timestamp(not_before))
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub async fn upsert_record(
    key: &str,
    operation: &str,
    response: &str,
    conn: &mut SqliteConnection,
) -> Result<(), LifecycleError> {
    sqlx::query(
        r#"
            INSERT INTO idempotency_records (key, operation, response) VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                operation = excluded.operation,
                response = excluded.response,
                created_at = strftime('%Y-%m-%d %H:%M:%f', 'now');
        "#,
    )
    .bind(key)
    .bind(operation)
    .bind(response)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn purge_records(cutoff: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, LifecycleError> {
    let result = sqlx::query("DELETE FROM idempotency_records WHERE created_at < $1")
        .bind(db_timestamp(cutoff))
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
