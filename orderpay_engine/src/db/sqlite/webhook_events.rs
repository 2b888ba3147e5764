use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use super::db_timestamp;
use crate::{
    db_types::{NewWebhookEvent, WebhookEvent},
    traits::LifecycleError,
};

pub async fn fetch_event(event_id: &str, conn: &mut SqliteConnection) -> Result<Option<WebhookEvent>, LifecycleError> {
    let event = sqlx::query_as::<_, WebhookEvent>("SELECT * FROM webhook_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

/// Inserts a ledger entry. An existing entry with the same id results in `DuplicateEvent`, and nothing is changed.
pub async fn insert_event(event: NewWebhookEvent, conn: &mut SqliteConnection) -> Result<WebhookEvent, LifecycleError> {
    let result = sqlx::query_as::<_, WebhookEvent>(
        r#"
            INSERT INTO webhook_events (event_id, event_type, payload_hash, outcome)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.event_type)
    .bind(&event.payload_hash)
    .bind(event.outcome)
    .fetch_one(conn)
    .await;
    match result {
        Ok(e) => {
            debug!("🗃️ Webhook event {} ({}) recorded as {}", e.event_id, e.event_type, e.outcome);
            Ok(e)
        },
        Err(e) if super::is_unique_violation(&e) => Err(LifecycleError::DuplicateEvent(event.event_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn purge_events(cutoff: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, LifecycleError> {
    let result =
        sqlx::query("DELETE FROM webhook_events WHERE received_at < $1").bind(db_timestamp(cutoff)).execute(conn).await?;
    Ok(result.rows_affected())
}
