use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    config::{cutoff_before, EngineConfig},
    traits::{IdempotencyManagement, LifecycleError, PurgeResult, WebhookLedger},
};

/// Housekeeping for the webhook ledger and the idempotency cache.
pub struct MaintenanceApi<B> {
    db: B,
    config: EngineConfig,
}

impl<B> Debug for MaintenanceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MaintenanceApi")
    }
}

impl<B> MaintenanceApi<B>
where B: WebhookLedger + IdempotencyManagement
{
    pub fn new(db: B, config: EngineConfig) -> Self {
        Self { db, config }
    }

    /// Deletes ledger entries older than the retention horizon and idempotency records older than their TTL.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeResult, LifecycleError> {
        let webhook_events = self.db.purge_webhook_events(cutoff_before(now, self.config.webhook_retention)).await?;
        let idempotency_records =
            self.db.purge_idempotency_records(cutoff_before(now, self.config.idempotency_key_ttl)).await?;
        let result = PurgeResult { webhook_events, idempotency_records };
        if result.total_count() > 0 {
            info!(
                "🕰️ Purged {webhook_events} webhook ledger entries and {idempotency_records} idempotency records"
            );
        }
        Ok(result)
    }
}
