use std::fmt::Debug;

use log::*;
use orderpay_common::MinorUnits;

use super::retry::call_with_retries;
use crate::{
    config::EngineConfig,
    db_types::{NewRefund, Page, Pagination, Refund, RefundStatus, RefundUpdate},
    events::EventProducers,
    helpers::{idempotency_key, GatewayOperation},
    traits::{CreateRefundRequest, GatewayError, LifecycleError, PaymentGateway, RefundManagement, RefundStats},
};

/// `RefundCoordinator` issues refunds against succeeded authorizations and keeps the total refunded within the
/// captured amount.
pub struct RefundCoordinator<B, G> {
    db: B,
    gateway: G,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B, G> Debug for RefundCoordinator<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundCoordinator")
    }
}

impl<B, G> RefundCoordinator<B, G> {
    pub fn new(db: B, gateway: G, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, gateway, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> RefundCoordinator<B, G>
where
    B: RefundManagement,
    G: PaymentGateway,
{
    /// Refunds `amount` (or everything still refundable, if `None`) of a succeeded authorization.
    ///
    /// The refund is reserved locally first, so concurrent requests cannot exceed the captured amount between them.
    /// The gateway is then asked to issue it:
    /// * a synchronous success or failure is applied immediately,
    /// * a pending result leaves the refund `Requested` until the gateway's webhook arrives,
    /// * if the gateway cannot be reached the refund also stays `Requested`, and the error is returned.
    pub async fn create_refund(
        &self,
        authorization_id: &str,
        amount: Option<MinorUnits>,
        reason: &str,
    ) -> Result<Refund, LifecycleError> {
        if let Some(amount) = amount {
            if !amount.is_positive() {
                return Err(LifecycleError::ValidationError(format!("Refund amount must be positive, not {amount}")));
            }
        }
        let refund = self.db.reserve_refund(NewRefund::new(authorization_id, amount, reason)).await?;
        info!("🔄️💸️ Refund {} of {} requested for authorization {authorization_id}", refund.id, refund.amount);
        let request = gateway_request(&refund);
        let policy = self.config.retry.for_mutation();
        let result = call_with_retries("create_refund", &policy, self.config.gateway_timeout, || {
            self.gateway.create_refund(&request)
        })
        .await;
        let gateway_refund = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("🔄️💸️ Refund {} remains requested. The gateway call failed: {e}", refund.id);
                return Err(e.into());
            },
        };
        let refund = self.db.attach_gateway_refund_id(&refund.id, &gateway_refund.refund_id).await?;
        if gateway_refund.status == RefundStatus::Requested {
            debug!("🔄️💸️ Refund {} is pending on the gateway", refund.id);
            return Ok(refund);
        }
        self.apply_refund_status(refund, gateway_refund.status).await
    }

    pub async fn get_refund(&self, refund_id: &str) -> Result<Refund, LifecycleError> {
        self.db.fetch_refund(refund_id).await?.ok_or_else(|| LifecycleError::RefundNotFound(refund_id.to_string()))
    }

    /// Cancels a refund that is still `Requested`, releasing its reservation.
    ///
    /// A refund without a gateway id may still have reached the gateway if every response to the create call was lost.
    /// The create call is re-issued with the same idempotency key to find out, and only a refund the gateway declines
    /// is cancelled locally. If the gateway has already paid it out, the refund is settled instead and an
    /// `InvalidTransition` error is returned.
    pub async fn cancel_refund(&self, refund_id: &str) -> Result<Refund, LifecycleError> {
        let refund = self.get_refund(refund_id).await?;
        if refund.status != RefundStatus::Requested {
            return Err(LifecycleError::InvalidTransition(format!(
                "Refund {refund_id} is {} and can no longer be cancelled",
                refund.status
            )));
        }
        let gateway_id = match refund.gateway_refund_id.clone() {
            Some(id) => Some(id),
            None => self.find_gateway_refund(&refund).await?,
        };
        let status = match gateway_id {
            Some(gateway_id) => {
                let policy = self.config.retry.for_mutation();
                call_with_retries("cancel_refund", &policy, self.config.gateway_timeout, || {
                    self.gateway.cancel_refund(&gateway_id)
                })
                .await?
            },
            None => RefundStatus::Cancelled,
        };
        let updated = self.apply_refund_status(refund, status).await?;
        if updated.status != RefundStatus::Cancelled {
            return Err(LifecycleError::InvalidTransition(format!(
                "Refund {refund_id} is {} and could not be cancelled",
                updated.status
            )));
        }
        info!("🔄️💸️ Refund {refund_id} cancelled");
        Ok(updated)
    }

    pub async fn refunds_by_user(&self, user_id: &str, pagination: Pagination) -> Result<Page<Refund>, LifecycleError> {
        self.db.refunds_for_user(user_id, pagination).await
    }

    pub async fn refund_stats(&self, user_id: &str) -> Result<RefundStats, LifecycleError> {
        self.db.refund_stats_for_user(user_id).await
    }

    /// Re-issues the create call for a refund that has no gateway id. Returns the gateway id it is attached to, or
    /// `None` if the gateway declined the refund, in which case it never took effect there.
    async fn find_gateway_refund(&self, refund: &Refund) -> Result<Option<String>, LifecycleError> {
        debug!("🔄️💸️ Refund {} has no gateway id. Checking whether the gateway holds it.", refund.id);
        let request = gateway_request(refund);
        let policy = self.config.retry.for_mutation();
        let result = call_with_retries("create_refund", &policy, self.config.gateway_timeout, || {
            self.gateway.create_refund(&request)
        })
        .await;
        match result {
            Ok(gateway_refund) => {
                self.db.attach_gateway_refund_id(&refund.id, &gateway_refund.refund_id).await?;
                info!("🔄️💸️ Refund {} is known to the gateway as {}", refund.id, gateway_refund.refund_id);
                Ok(Some(gateway_refund.refund_id))
            },
            Err(GatewayError::Rejected { code, message }) => {
                info!("🔄️💸️ Gateway declined refund {} ({code}: {message}). Cancelling it locally.", refund.id);
                Ok(None)
            },
            Err(e) => {
                warn!("🔄️💸️ Refund {} remains requested. The gateway call failed: {e}", refund.id);
                Err(e.into())
            },
        }
    }

    async fn apply_refund_status(&self, refund: Refund, status: RefundStatus) -> Result<Refund, LifecycleError> {
        if refund.status == status {
            return Ok(refund);
        }
        if !refund.status.can_transition_to(status) {
            warn!(
                "🔄️💸️ Gateway reports refund {} as {status}, but it is already {}. Keeping the first terminal state.",
                refund.id, refund.status
            );
            return Ok(refund);
        }
        let update = RefundUpdate {
            refund_id: refund.id.clone(),
            expected_status: refund.status,
            new_status: status,
            ledger_entry: None,
        };
        match self.db.apply_refund_update(update).await {
            Ok(result) => {
                self.producers.publish_refund_settled(&result.refund).await;
                if let Some(order) = &result.order {
                    info!("🔄️💸️ Order {} is fully refunded", order.id);
                    self.producers.publish_order_change(order, None).await;
                }
                Ok(result.refund)
            },
            Err(e @ LifecycleError::VersionConflict { .. }) => {
                // Most likely the webhook for this refund landed first
                let current = self.get_refund(&refund.id).await?;
                if current.status == status {
                    Ok(current)
                } else {
                    Err(e)
                }
            },
            Err(e) => Err(e),
        }
    }
}

/// The gateway request for `refund`. Every attempt for the same refund carries the same idempotency key.
fn gateway_request(refund: &Refund) -> CreateRefundRequest {
    CreateRefundRequest {
        authorization_id: refund.authorization_id.clone(),
        amount: refund.amount,
        idempotency_key: idempotency_key(&refund.id, GatewayOperation::CreateRefund),
    }
}
