use std::{fmt::Debug, sync::Arc, time::Duration};

use log::*;
use tokio::sync::Semaphore;

use super::{webhook_objects::Ack, webhook_reconciler::WebhookReconciler};
use crate::traits::{LifecycleDatabase, LifecycleError, PaymentGateway};

/// Bounds webhook processing: at most `workers` events are handled at once, and each one gets `timeout` to finish.
///
/// An event that times out is abandoned mid-flight. Its database transaction is rolled back, so the ledger is left
/// untouched and the gateway's redelivery will process the event afresh.
pub struct WebhookDispatcher<B, G> {
    reconciler: WebhookReconciler<B, G>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl<B, G> Debug for WebhookDispatcher<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookDispatcher ({} permits available)", self.permits.available_permits())
    }
}

impl<B, G> WebhookDispatcher<B, G> {
    pub fn new(reconciler: WebhookReconciler<B, G>, workers: usize, timeout: Duration) -> Self {
        Self { reconciler, permits: Arc::new(Semaphore::new(workers.max(1))), timeout }
    }

    pub fn reconciler(&self) -> &WebhookReconciler<B, G> {
        &self.reconciler
    }
}

impl<B, G> WebhookDispatcher<B, G>
where
    B: LifecycleDatabase,
    G: PaymentGateway,
{
    pub async fn dispatch(&self, payload: &[u8], signature: &str) -> Result<Ack, LifecycleError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LifecycleError::GatewayUnavailable("Webhook processing has shut down".into()))?;
        match tokio::time::timeout(self.timeout, self.reconciler.handle_event(payload, signature)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("🕰️ Webhook processing did not finish within {:?}. The event was not recorded.", self.timeout);
                Err(LifecycleError::Timeout("Webhook processing timed out".into()))
            },
        }
    }
}
