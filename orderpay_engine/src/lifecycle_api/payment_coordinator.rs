use std::{collections::BTreeMap, fmt::Debug};

use chrono::Utc;
use log::*;
use orderpay_common::MinorUnits;

use super::{authorization_sync::order_cascade, retry::call_with_retries};
use crate::{
    config::{cutoff_before, EngineConfig},
    db_types::{
        Authorization,
        AuthorizationStatus,
        AuthorizationUpdate,
        NewAuthorization,
        OrderId,
        OrderStatusType,
        OrderTransition,
        Page,
        Pagination,
    },
    events::EventProducers,
    helpers::{idempotency_key, GatewayOperation},
    traits::{
        CreateAuthorizationRequest,
        GatewayAuthorization,
        IdempotencyManagement,
        LifecycleError,
        OrderManagement,
        PaymentGateway,
        PaymentManagement,
    },
};

/// Number of times a gateway result is re-applied after losing a race with a concurrent writer.
const MAX_APPLY_ATTEMPTS: usize = 3;

/// `PaymentCoordinator` drives gateway authorizations for orders: creation, confirmation, cancellation and
/// status synchronisation. The gateway is authoritative for payment state; the local row is a projection of it.
pub struct PaymentCoordinator<B, G> {
    db: B,
    gateway: G,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B, G> Debug for PaymentCoordinator<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentCoordinator")
    }
}

impl<B, G> PaymentCoordinator<B, G> {
    pub fn new(db: B, gateway: G, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, gateway, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

impl<B, G> PaymentCoordinator<B, G>
where
    B: OrderManagement + PaymentManagement + IdempotencyManagement,
    G: PaymentGateway,
{
    /// Creates a gateway authorization for a `Pending` order and moves the order to `Authorizing`.
    ///
    /// The amount must lie within the configured bounds, and both amount and currency must match the order. The
    /// gateway call uses an idempotency key derived from the order id, so a retried request cannot create a second
    /// authorization. If storing the result locally fails, the gateway authorization is cancelled on a best-effort
    /// basis and the error is returned.
    pub async fn create_authorization(
        &self,
        amount: MinorUnits,
        currency: &str,
        order_id: &OrderId,
        metadata: BTreeMap<String, String>,
    ) -> Result<Authorization, LifecycleError> {
        self.config.validate_amount(amount)?;
        let currency = self.config.validate_currency(currency)?;
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| LifecycleError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Pending {
            return Err(LifecycleError::InvalidTransition(format!(
                "Order {order_id} is {} and cannot be authorized",
                order.status
            )));
        }
        if order.amount != amount || order.currency != currency {
            return Err(LifecycleError::ValidationError(format!(
                "Payment of {amount} {currency} does not match order {order_id} ({} {})",
                order.amount, order.currency
            )));
        }
        let key = idempotency_key(order_id.as_str(), GatewayOperation::CreateAuthorization);
        let mut metadata = metadata;
        metadata.insert("order_id".to_string(), order_id.as_str().to_string());
        let request = CreateAuthorizationRequest {
            amount,
            currency: currency.to_ascii_lowercase(),
            idempotency_key: key.clone(),
            metadata,
        };
        let gateway_auth = self.create_gateway_authorization(&request).await?;
        let new_auth = NewAuthorization {
            id: gateway_auth.authorization_id.clone(),
            order_id: order_id.clone(),
            amount,
            currency,
            client_secret: gateway_auth.client_secret.clone(),
            idempotency_key: key,
        };
        let transition = OrderTransition::for_order(&order, OrderStatusType::Authorizing)
            .with_authorization_id(&gateway_auth.authorization_id);
        let auth = match self.db.insert_authorization(new_auth, transition).await {
            Ok((auth, order)) => {
                info!("🔄️💳️ Authorization {} created for order {}", auth.id, order.id);
                auth
            },
            Err(e) => return self.handle_orphan(&gateway_auth.authorization_id, e).await,
        };
        if gateway_auth.status == AuthorizationStatus::RequiresConfirmation {
            Ok(auth)
        } else {
            self.apply_gateway_status(auth, gateway_auth.status).await
        }
    }

    /// Confirms the authorization with the gateway and applies the result.
    ///
    /// `Succeeded` moves the order to `Paid`, `Failed` to `Failed` and `Cancelled` to `Cancelled`. `Processing` only
    /// updates the authorization; the gateway's webhook completes it later. An authorization that is already terminal
    /// is returned unchanged.
    pub async fn confirm_authorization(
        &self,
        authorization_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Authorization, LifecycleError> {
        let auth = self.fetch_authorization(authorization_id).await?;
        if let Some(secret) = client_secret {
            if auth.client_secret.as_deref() != Some(secret) {
                return Err(LifecycleError::ValidationError("The client secret does not match".into()));
            }
        }
        if auth.status.is_terminal() {
            debug!("🔄️💳️ Authorization {authorization_id} is already {}. Nothing to confirm.", auth.status);
            return Ok(auth);
        }
        let order = self
            .db
            .fetch_order(&auth.order_id)
            .await?
            .ok_or_else(|| LifecycleError::OrderNotFound(auth.order_id.clone()))?;
        if order.status != OrderStatusType::Authorizing {
            // A webhook may have completed the authorization since it was read
            let current = self.fetch_authorization(authorization_id).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }
            return Err(LifecycleError::InvalidTransition(format!(
                "Order {} is {} and its payment can no longer be confirmed",
                order.id, order.status
            )));
        }
        let key = idempotency_key(auth.order_id.as_str(), GatewayOperation::ConfirmAuthorization);
        let policy = self.config.retry.for_mutation();
        let status = call_with_retries("confirm_authorization", &policy, self.config.gateway_timeout, || {
            self.gateway.confirm_authorization(&auth.id, &key)
        })
        .await?;
        debug!("🔄️💳️ Gateway reports authorization {authorization_id} as {status} after confirmation");
        self.apply_gateway_status(auth, status).await
    }

    /// Cancels an authorization that has not completed yet, and the order with it. A `Succeeded` authorization
    /// cannot be cancelled; it must be refunded.
    pub async fn cancel_authorization(&self, authorization_id: &str) -> Result<Authorization, LifecycleError> {
        let auth = self.fetch_authorization(authorization_id).await?;
        if !auth.status.is_cancellable() {
            let hint = if auth.status == AuthorizationStatus::Succeeded { " Refund it instead." } else { "" };
            return Err(LifecycleError::InvalidTransition(format!(
                "Authorization {authorization_id} is {} and cannot be cancelled.{hint}",
                auth.status
            )));
        }
        let policy = self.config.retry.for_mutation();
        let status = call_with_retries("cancel_authorization", &policy, self.config.gateway_timeout, || {
            self.gateway.cancel_authorization(&auth.id)
        })
        .await?;
        let updated = self.apply_gateway_status(auth, status).await?;
        if updated.status != AuthorizationStatus::Cancelled {
            return Err(LifecycleError::InvalidTransition(format!(
                "Authorization {authorization_id} is {} and could not be cancelled",
                updated.status
            )));
        }
        info!("🔄️💳️ Authorization {authorization_id} cancelled");
        Ok(updated)
    }

    /// Returns the authorization, brought up to date with the gateway's view of it. If the gateway cannot be reached,
    /// the local record is returned as is.
    pub async fn get_authorization(&self, authorization_id: &str) -> Result<Authorization, LifecycleError> {
        let auth = self.fetch_authorization(authorization_id).await?;
        if auth.status.is_terminal() {
            return Ok(auth);
        }
        let result = call_with_retries("retrieve_authorization", &self.config.retry, self.config.gateway_timeout, || {
            self.gateway.retrieve_authorization(&auth.id)
        })
        .await;
        match result {
            Ok(status) => self.apply_gateway_status(auth, status).await,
            Err(e) => {
                warn!("🔄️💳️ Could not refresh authorization {authorization_id} from the gateway. {e}");
                Ok(auth)
            },
        }
    }

    /// Local read, without contacting the gateway.
    pub async fn fetch_authorization(&self, authorization_id: &str) -> Result<Authorization, LifecycleError> {
        self.db
            .fetch_authorization(authorization_id)
            .await?
            .ok_or_else(|| LifecycleError::AuthorizationNotFound(authorization_id.to_string()))
    }

    pub async fn payment_history(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> Result<Page<Authorization>, LifecycleError> {
        self.db.payment_history(user_id, pagination).await
    }

    /// Calls the gateway to create the authorization, or reuses the gateway's earlier response for the same
    /// idempotency key if it is still within the TTL.
    async fn create_gateway_authorization(
        &self,
        request: &CreateAuthorizationRequest,
    ) -> Result<GatewayAuthorization, LifecycleError> {
        let key = request.idempotency_key.as_str();
        let not_before = cutoff_before(Utc::now(), self.config.idempotency_key_ttl);
        if let Some(record) = self.db.fetch_idempotency_record(key, not_before).await? {
            match serde_json::from_str::<GatewayAuthorization>(&record.response) {
                Ok(cached) => {
                    debug!("🔄️💳️ Reusing cached gateway authorization {} for {key}", cached.authorization_id);
                    return Ok(cached);
                },
                Err(e) => warn!("🔄️💳️ Ignoring unreadable idempotency record for {key}. {e}"),
            }
        }
        let policy = self.config.retry.for_mutation();
        let result = call_with_retries("create_authorization", &policy, self.config.gateway_timeout, || {
            self.gateway.create_authorization(request)
        })
        .await?;
        match serde_json::to_string(&result) {
            Ok(json) => {
                let op = GatewayOperation::CreateAuthorization.to_string();
                if let Err(e) = self.db.save_idempotency_record(key, &op, &json).await {
                    warn!("🔄️💳️ Could not cache the gateway response for {key}. {e}");
                }
            },
            Err(e) => warn!("🔄️💳️ Could not serialize the gateway response for {key}. {e}"),
        }
        Ok(result)
    }

    /// The gateway created an authorization, but it could not be stored locally. If a concurrent request for the
    /// same order stored it (same idempotency key, so same gateway authorization), that record is the result.
    /// Otherwise the gateway authorization is an orphan and is cancelled.
    async fn handle_orphan(&self, gateway_id: &str, error: LifecycleError) -> Result<Authorization, LifecycleError> {
        if let Ok(Some(existing)) = self.db.fetch_authorization(gateway_id).await {
            debug!("🔄️💳️ Authorization {gateway_id} was stored by a concurrent request");
            return Ok(existing);
        }
        warn!("🔄️💳️ Could not store authorization {gateway_id}. {error}. Cancelling the orphan on the gateway.");
        let policy = self.config.retry.for_mutation();
        let cancelled = call_with_retries("cancel_authorization", &policy, self.config.gateway_timeout, || {
            self.gateway.cancel_authorization(gateway_id)
        })
        .await;
        if let Err(e) = cancelled {
            error!("🔄️💳️ Orphaned gateway authorization {gateway_id} could not be cancelled. {e}");
        }
        Err(error)
    }

    /// Brings the local authorization (and its order) in line with a status reported by the gateway.
    ///
    /// Repeating the current status is a no-op. A status that the local record cannot move to (because another
    /// terminal status was applied first) is logged and ignored. Conflicts with concurrent writers are retried with a
    /// fresh read.
    async fn apply_gateway_status(
        &self,
        auth: Authorization,
        status: AuthorizationStatus,
    ) -> Result<Authorization, LifecycleError> {
        let mut auth = auth;
        let mut last_error = None;
        for attempt in 0..MAX_APPLY_ATTEMPTS {
            if attempt > 0 {
                auth = self.fetch_authorization(&auth.id).await?;
            }
            if auth.status == status {
                return Ok(auth);
            }
            if !auth.status.can_transition_to(status) {
                warn!(
                    "🔄️💳️ Gateway reports authorization {} as {status}, but it is already {}. Keeping the first \
                     terminal state.",
                    auth.id, auth.status
                );
                return Ok(auth);
            }
            let order_transition = order_cascade(&self.db, &auth, status).await?;
            let update = AuthorizationUpdate {
                authorization_id: auth.id.clone(),
                expected_status: auth.status,
                new_status: status,
                order_transition,
                ledger_entry: None,
            };
            match self.db.apply_authorization_update(update).await {
                Ok(result) => {
                    if let Some(order) = &result.order {
                        self.producers.publish_order_change(order, Some(&result.authorization)).await;
                    }
                    return Ok(result.authorization);
                },
                Err(e @ LifecycleError::VersionConflict { .. }) => {
                    debug!("🔄️💳️ Lost a race updating authorization {}. {e}", auth.id);
                    last_error = Some(e);
                },
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| LifecycleError::DatabaseError("authorization update did not run".into())))
    }
}
