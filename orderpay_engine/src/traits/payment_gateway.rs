use std::collections::BTreeMap;

use log::warn;
use orderpay_common::{MinorUnits, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{AuthorizationStatus, RefundStatus},
    helpers::verify_hmac_signature,
    traits::LifecycleError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAuthorizationRequest {
    pub amount: MinorUnits,
    /// Lower-case ISO 4217 code, as gateways expect
    pub currency: String,
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAuthorization {
    pub authorization_id: String,
    pub status: AuthorizationStatus,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRefundRequest {
    pub authorization_id: String,
    pub amount: MinorUnits,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub refund_id: String,
    /// `Requested` means the gateway has accepted the refund but will report the outcome asynchronously
    pub status: RefundStatus,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway could not be reached: {0}")]
    Unavailable(String),
    #[error("Gateway call timed out")]
    Timeout,
    #[error("Gateway rejected the request ({code}): {message}")]
    Rejected { code: u16, message: String },
    #[error("Gateway returned a response that could not be understood: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transient failures, where the side effect may or may not have landed on the gateway.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Gateway error details are logged here and never passed on, so that callers cannot see the gateway's response
/// bodies.
impl From<GatewayError> for LifecycleError {
    fn from(e: GatewayError) -> Self {
        warn!("💳️ Gateway call failed. {e}");
        match e {
            GatewayError::Unavailable(_) => Self::GatewayUnavailable("The payment gateway could not be reached".into()),
            GatewayError::Timeout => Self::Timeout("The payment gateway did not respond in time".into()),
            GatewayError::Rejected { .. } => Self::ValidationError("The payment gateway declined the request".into()),
            GatewayError::InvalidResponse(_) => {
                Self::GatewayUnavailable("The payment gateway returned an unexpected response".into())
            },
        }
    }
}

/// The narrow interface to the external payment gateway. The gateway's internals (card networks, fraud scoring,
/// settlement) are out of scope for the engine.
///
/// Mutating calls take an idempotency key; the same logical operation must always present the same key so that the
/// gateway deduplicates retries at its boundary.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn create_authorization(
        &self,
        request: &CreateAuthorizationRequest,
    ) -> Result<GatewayAuthorization, GatewayError>;

    async fn confirm_authorization(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<AuthorizationStatus, GatewayError>;

    async fn cancel_authorization(&self, authorization_id: &str) -> Result<AuthorizationStatus, GatewayError>;

    /// Reads the gateway's current view of the authorization. Safe to retry.
    async fn retrieve_authorization(&self, authorization_id: &str) -> Result<AuthorizationStatus, GatewayError>;

    async fn create_refund(&self, request: &CreateRefundRequest) -> Result<GatewayRefund, GatewayError>;

    async fn cancel_refund(&self, refund_id: &str) -> Result<RefundStatus, GatewayError>;

    /// Checks that `header` is the signature of `payload` under the shared `secret`.
    ///
    /// The default scheme is a base64-encoded HMAC-SHA256 of the raw payload.
    fn verify_webhook_signature(&self, payload: &[u8], header: &str, secret: &Secret<String>) -> bool {
        verify_hmac_signature(secret.reveal(), payload, header)
    }
}
