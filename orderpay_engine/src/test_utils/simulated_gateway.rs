//! An in-memory payment gateway for tests.
//!
//! The simulated gateway keeps its own view of authorizations and refunds, honours idempotency keys the way a real
//! gateway does, and can be scripted: the outcome of confirmations and refunds, injected outages, lost responses and
//! slow calls.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    db_types::{AuthorizationStatus, RefundStatus},
    helpers::calculate_hmac,
    lifecycle_api::{EventKind, GatewayEvent},
    traits::{CreateAuthorizationRequest, CreateRefundRequest, GatewayAuthorization, GatewayError, GatewayRefund, PaymentGateway},
};

#[derive(Debug)]
struct GatewayState {
    authorizations: HashMap<String, (AuthorizationStatus, String)>,
    authorizations_by_key: HashMap<String, String>,
    refunds: HashMap<String, RefundStatus>,
    refunds_by_key: HashMap<String, String>,
    create_status: AuthorizationStatus,
    confirm_outcome: AuthorizationStatus,
    refund_outcome: RefundStatus,
    fail_next: u32,
    lose_next: u32,
    delay: Option<Duration>,
    calls: HashMap<&'static str, u32>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self {
            authorizations: HashMap::new(),
            authorizations_by_key: HashMap::new(),
            refunds: HashMap::new(),
            refunds_by_key: HashMap::new(),
            create_status: AuthorizationStatus::RequiresConfirmation,
            confirm_outcome: AuthorizationStatus::Succeeded,
            refund_outcome: RefundStatus::Succeeded,
            fail_next: 0,
            lose_next: 0,
            delay: None,
            calls: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    secret: String,
    state: Arc<Mutex<GatewayState>>,
}

impl SimulatedGateway {
    pub fn new(webhook_secret: &str) -> Self {
        Self { secret: webhook_secret.to_string(), state: Arc::new(Mutex::new(GatewayState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().expect("Simulated gateway state is poisoned")
    }

    /// The status that `confirm_authorization` moves authorizations to.
    pub fn set_confirm_outcome(&self, status: AuthorizationStatus) {
        self.state().confirm_outcome = status;
    }

    /// The status that newly created authorizations start in.
    pub fn set_create_status(&self, status: AuthorizationStatus) {
        self.state().create_status = status;
    }

    /// The status that `create_refund` returns. `Requested` means the outcome arrives by webhook.
    pub fn set_refund_outcome(&self, status: RefundStatus) {
        self.state().refund_outcome = status;
    }

    /// The next `n` calls fail with `Unavailable`, without any effect on the gateway.
    pub fn fail_next(&self, n: u32) {
        self.state().fail_next = n;
    }

    /// The next `n` mutating calls take effect on the gateway, but their responses are lost.
    pub fn lose_next_responses(&self, n: u32) {
        self.state().lose_next = n;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    pub fn call_count(&self, operation: &str) -> u32 {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn authorization_count(&self) -> usize {
        self.state().authorizations.len()
    }

    pub fn authorization_status(&self, id: &str) -> Option<AuthorizationStatus> {
        self.state().authorizations.get(id).map(|(s, _)| *s)
    }

    pub fn refund_status(&self, id: &str) -> Option<RefundStatus> {
        self.state().refunds.get(id).copied()
    }

    /// Changes an authorization on the gateway side, as if the card network had responded.
    pub fn settle_authorization(&self, id: &str, status: AuthorizationStatus) {
        if let Some(entry) = self.state().authorizations.get_mut(id) {
            entry.0 = status;
        }
    }

    pub fn settle_refund(&self, id: &str, status: RefundStatus) {
        if let Some(entry) = self.state().refunds.get_mut(id) {
            *entry = status;
        }
    }

    /// Signs a payload with the webhook secret, the way the gateway signs its deliveries.
    pub fn sign(&self, payload: &[u8]) -> String {
        calculate_hmac(&self.secret, payload)
    }

    /// Builds a webhook delivery and its signature header.
    pub fn webhook(&self, event_id: &str, kind: EventKind, object_id: &str) -> (Vec<u8>, String) {
        let event = GatewayEvent::new(event_id, kind, object_id);
        let payload = serde_json::to_vec(&event).expect("Could not serialize gateway event");
        let signature = self.sign(&payload);
        (payload, signature)
    }

    async fn begin_call(&self, operation: &'static str) -> Result<(), GatewayError> {
        let delay = {
            let mut state = self.state();
            *state.calls.entry(operation).or_default() += 1;
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(GatewayError::Unavailable(format!("simulated outage during {operation}")));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn end_call<T>(&self, operation: &'static str, result: T) -> Result<T, GatewayError> {
        let mut state = self.state();
        if state.lose_next > 0 {
            state.lose_next -= 1;
            return Err(GatewayError::Unavailable(format!("simulated lost response for {operation}")));
        }
        Ok(result)
    }

    fn unknown(id: &str) -> GatewayError {
        GatewayError::Rejected { code: 404, message: format!("No such object: {id}") }
    }
}

impl PaymentGateway for SimulatedGateway {
    async fn create_authorization(
        &self,
        request: &CreateAuthorizationRequest,
    ) -> Result<GatewayAuthorization, GatewayError> {
        self.begin_call("create_authorization").await?;
        if !request.amount.is_positive() {
            return Err(GatewayError::Rejected { code: 400, message: "amount must be positive".into() });
        }
        let result = {
            let mut state = self.state();
            let existing = state.authorizations_by_key.get(&request.idempotency_key).cloned();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = format!("auth_{:016x}", rand::random::<u64>());
                    let secret = format!("{id}_secret_{:08x}", rand::random::<u32>());
                    let status = state.create_status;
                    state.authorizations.insert(id.clone(), (status, secret));
                    state.authorizations_by_key.insert(request.idempotency_key.clone(), id.clone());
                    id
                },
            };
            let (status, secret) = state.authorizations.get(&id).cloned().ok_or_else(|| Self::unknown(&id))?;
            GatewayAuthorization { authorization_id: id, status, client_secret: Some(secret) }
        };
        self.end_call("create_authorization", result)
    }

    async fn confirm_authorization(
        &self,
        authorization_id: &str,
        _idempotency_key: &str,
    ) -> Result<AuthorizationStatus, GatewayError> {
        self.begin_call("confirm_authorization").await?;
        let status = {
            let mut state = self.state();
            let outcome = state.confirm_outcome;
            let entry = state.authorizations.get_mut(authorization_id).ok_or_else(|| Self::unknown(authorization_id))?;
            if entry.0.can_transition_to(outcome) {
                entry.0 = outcome;
            }
            entry.0
        };
        self.end_call("confirm_authorization", status)
    }

    async fn cancel_authorization(&self, authorization_id: &str) -> Result<AuthorizationStatus, GatewayError> {
        self.begin_call("cancel_authorization").await?;
        let status = {
            let mut state = self.state();
            let entry = state.authorizations.get_mut(authorization_id).ok_or_else(|| Self::unknown(authorization_id))?;
            if entry.0.is_cancellable() {
                entry.0 = AuthorizationStatus::Cancelled;
            }
            entry.0
        };
        self.end_call("cancel_authorization", status)
    }

    async fn retrieve_authorization(&self, authorization_id: &str) -> Result<AuthorizationStatus, GatewayError> {
        self.begin_call("retrieve_authorization").await?;
        self.authorization_status(authorization_id).ok_or_else(|| Self::unknown(authorization_id))
    }

    async fn create_refund(&self, request: &CreateRefundRequest) -> Result<GatewayRefund, GatewayError> {
        self.begin_call("create_refund").await?;
        let refund = {
            let mut state = self.state();
            match state.authorizations.get(&request.authorization_id) {
                Some((AuthorizationStatus::Succeeded, _)) => {},
                Some(_) => {
                    return Err(GatewayError::Rejected { code: 400, message: "authorization is not captured".into() })
                },
                None => return Err(Self::unknown(&request.authorization_id)),
            }
            let existing = state.refunds_by_key.get(&request.idempotency_key).cloned();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = format!("re_{:016x}", rand::random::<u64>());
                    let status = state.refund_outcome;
                    state.refunds.insert(id.clone(), status);
                    state.refunds_by_key.insert(request.idempotency_key.clone(), id.clone());
                    id
                },
            };
            let status = state.refunds.get(&id).copied().ok_or_else(|| Self::unknown(&id))?;
            GatewayRefund { refund_id: id, status }
        };
        self.end_call("create_refund", refund)
    }

    async fn cancel_refund(&self, refund_id: &str) -> Result<RefundStatus, GatewayError> {
        self.begin_call("cancel_refund").await?;
        let status = {
            let mut state = self.state();
            let entry = state.refunds.get_mut(refund_id).ok_or_else(|| Self::unknown(refund_id))?;
            if *entry == RefundStatus::Requested {
                *entry = RefundStatus::Cancelled;
            }
            *entry
        };
        self.end_call("cancel_refund", status)
    }
}
