use std::time::Duration;

use chrono::Utc;
use log::*;
use orderpay_engine::{EngineConfig, MaintenanceApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the maintenance worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_maintenance_worker(db: SqliteDatabase, config: EngineConfig, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = MaintenanceApi::new(db, config);
        info!("🕰️ Maintenance worker started. Expired records are purged every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running maintenance job");
            match api.purge_expired(Utc::now()).await {
                Ok(result) => {
                    debug!(
                        "🕰️ {} records purged ({} webhook events, {} idempotency records)",
                        result.total_count(),
                        result.webhook_events,
                        result.idempotency_records
                    );
                },
                Err(e) => {
                    error!("🕰️ Error running maintenance job: {e}");
                },
            }
        }
    })
}
