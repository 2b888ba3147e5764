use std::fmt::Debug;

use log::*;

use super::{
    authorization_sync::order_cascade,
    webhook_objects::{Ack, EventKind, GatewayEvent},
};
use crate::{
    config::EngineConfig,
    db_types::{AuthorizationStatus, AuthorizationUpdate, EventOutcome, NewWebhookEvent, RefundStatus, RefundUpdate},
    events::EventProducers,
    helpers::payload_hash,
    traits::{LifecycleDatabase, LifecycleError, PaymentGateway},
};

/// `WebhookReconciler` applies asynchronous gateway events to local state.
///
/// Events are authenticated, deduplicated through the ledger, and applied only when they describe a valid transition
/// from the entity's current state. The status change, the cascading order transition and the ledger entry are
/// committed together; if any of them fails, nothing is recorded and the gateway will redeliver the event.
pub struct WebhookReconciler<B, G> {
    db: B,
    gateway: G,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B, G> Debug for WebhookReconciler<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookReconciler")
    }
}

impl<B, G> WebhookReconciler<B, G> {
    pub fn new(db: B, gateway: G, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, gateway, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> WebhookReconciler<B, G>
where
    B: LifecycleDatabase,
    G: PaymentGateway,
{
    pub async fn handle_event(&self, payload: &[u8], signature: &str) -> Result<Ack, LifecycleError> {
        if !self.gateway.verify_webhook_signature(payload, signature, &self.config.webhook_secret) {
            warn!("🔐️ Webhook signature verification failed. The delivery has been rejected.");
            return Err(LifecycleError::SignatureVerificationError);
        }
        let event = serde_json::from_slice::<GatewayEvent>(payload)
            .map_err(|e| LifecycleError::ValidationError(format!("Malformed webhook payload. {e}")))?;
        let kind = event.kind().map_err(LifecycleError::ValidationError)?;
        if self.db.fetch_webhook_event(&event.id).await?.is_some() {
            debug!("📬️ Webhook event {} has already been processed", event.id);
            return Ok(Ack::Duplicate);
        }
        trace!("📬️ Processing webhook event {} ({}) for {}", event.id, event.event_type, event.data.object_id);
        let ledger_entry = |outcome| NewWebhookEvent {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            payload_hash: payload_hash(payload),
            outcome,
        };
        let result = match kind {
            EventKind::Authorization(status) => {
                self.apply_authorization_event(&event, status, ledger_entry(EventOutcome::Applied)).await
            },
            EventKind::Refund(status) => {
                self.apply_refund_event(&event, status, ledger_entry(EventOutcome::Applied)).await
            },
        };
        match result {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => self.record_discarded(ledger_entry(EventOutcome::Discarded)).await,
            Err(LifecycleError::DuplicateEvent(id)) => {
                debug!("📬️ Webhook event {id} was processed concurrently");
                Ok(Ack::Duplicate)
            },
            // A concurrent delivery of the same event may have won the race for the entity
            Err(e @ LifecycleError::VersionConflict { .. }) => match self.db.fetch_webhook_event(&event.id).await? {
                Some(_) => {
                    debug!("📬️ Webhook event {} was processed concurrently", event.id);
                    Ok(Ack::Duplicate)
                },
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Returns `None` if the event must be recorded as discarded.
    async fn apply_authorization_event(
        &self,
        event: &GatewayEvent,
        status: AuthorizationStatus,
        ledger_entry: NewWebhookEvent,
    ) -> Result<Option<Ack>, LifecycleError> {
        let auth_id = event.data.object_id.as_str();
        let auth = self
            .db
            .fetch_authorization(auth_id)
            .await?
            .ok_or_else(|| LifecycleError::AuthorizationNotFound(auth_id.to_string()))?;
        if auth.status == status {
            debug!("📬️ Authorization {auth_id} is already {status}. Event {} is a no-op.", event.id);
            return Ok(None);
        }
        if !auth.status.can_transition_to(status) {
            warn!(
                "📬️ Event {} would move authorization {auth_id} from {} to {status}. Discarding it.",
                event.id, auth.status
            );
            return Ok(None);
        }
        let order_transition = order_cascade(&self.db, &auth, status).await?;
        let update = AuthorizationUpdate {
            authorization_id: auth.id.clone(),
            expected_status: auth.status,
            new_status: status,
            order_transition,
            ledger_entry: Some(ledger_entry),
        };
        let result = self.db.apply_authorization_update(update).await?;
        info!("📬️ Event {} moved authorization {auth_id} to {status}", event.id);
        if let Some(order) = &result.order {
            self.producers.publish_order_change(order, Some(&result.authorization)).await;
        }
        Ok(Some(Ack::Applied))
    }

    async fn apply_refund_event(
        &self,
        event: &GatewayEvent,
        status: RefundStatus,
        ledger_entry: NewWebhookEvent,
    ) -> Result<Option<Ack>, LifecycleError> {
        let object_id = event.data.object_id.as_str();
        let refund = match self.db.fetch_refund_by_gateway_id(object_id).await? {
            Some(r) => r,
            None => {
                self.db.fetch_refund(object_id).await?.ok_or_else(|| LifecycleError::RefundNotFound(object_id.into()))?
            },
        };
        if refund.status == status {
            debug!("📬️ Refund {} is already {status}. Event {} is a no-op.", refund.id, event.id);
            return Ok(None);
        }
        if !refund.status.can_transition_to(status) {
            warn!(
                "📬️ Event {} would move refund {} from {} to {status}. Discarding it.",
                event.id, refund.id, refund.status
            );
            return Ok(None);
        }
        let update = RefundUpdate {
            refund_id: refund.id.clone(),
            expected_status: refund.status,
            new_status: status,
            ledger_entry: Some(ledger_entry),
        };
        let result = self.db.apply_refund_update(update).await?;
        info!("📬️ Event {} moved refund {} to {status}", event.id, refund.id);
        self.producers.publish_refund_settled(&result.refund).await;
        if let Some(order) = &result.order {
            self.producers.publish_order_change(order, None).await;
        }
        Ok(Some(Ack::Applied))
    }

    async fn record_discarded(&self, entry: NewWebhookEvent) -> Result<Ack, LifecycleError> {
        match self.db.record_webhook_event(entry).await {
            Ok(_) => Ok(Ack::Discarded),
            Err(LifecycleError::DuplicateEvent(_)) => Ok(Ack::Duplicate),
            Err(e) => Err(e),
        }
    }
}
