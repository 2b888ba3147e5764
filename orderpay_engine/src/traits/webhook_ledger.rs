use chrono::{DateTime, Utc};

use crate::{
    db_types::{IdempotencyRecord, NewWebhookEvent, WebhookEvent},
    traits::LifecycleError,
};

/// The webhook event ledger. Every event accepted for processing is recorded here, so that redelivery is a no-op.
#[allow(async_fn_in_trait)]
pub trait WebhookLedger: Clone {
    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, LifecycleError>;

    /// Records an event whose effects were not applied. Fails with `DuplicateEvent` if the id is already recorded.
    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<WebhookEvent, LifecycleError>;

    /// Deletes ledger entries received before `cutoff`. Returns the number of entries removed.
    async fn purge_webhook_events(&self, cutoff: DateTime<Utc>) -> Result<u64, LifecycleError>;
}

/// Local cache of gateway responses for mutating calls, keyed by idempotency key.
#[allow(async_fn_in_trait)]
pub trait IdempotencyManagement: Clone {
    /// Fetches the record for `key` if it was created at or after `not_before`.
    async fn fetch_idempotency_record(
        &self,
        key: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, LifecycleError>;

    /// Saves the response for `key`. If a record already exists, it is replaced.
    async fn save_idempotency_record(&self, key: &str, operation: &str, response: &str)
        -> Result<(), LifecycleError>;

    async fn purge_idempotency_records(&self, cutoff: DateTime<Utc>) -> Result<u64, LifecycleError>;
}
