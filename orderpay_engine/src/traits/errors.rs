use orderpay_common::MinorUnits;
use thiserror::Error;

use crate::db_types::OrderId;

/// The error taxonomy shared by every component of the engine.
///
/// [`LifecycleError::GatewayUnavailable`] and [`LifecycleError::Timeout`] are worth retrying as-is.
/// A [`LifecycleError::VersionConflict`] is retryable after a re-read: the caller should decide whether the operation
/// it intended still makes sense.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("The requested state change is not permitted. {0}")]
    InvalidTransition(String),
    #[error("{entity} was modified concurrently (expected {expected}, found {actual}). Order already in terminal or advanced state.")]
    VersionConflict { entity: String, expected: String, actual: String },
    #[error("The webhook signature could not be verified.")]
    SignatureVerificationError,
    #[error("The payment gateway is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("The refund of {requested} exceeds the remaining refundable amount of {remaining}")]
    RefundExceedsCapturedAmount { requested: MinorUnits, remaining: MinorUnits },
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested authorization {0} does not exist")]
    AuthorizationNotFound(String),
    #[error("The requested refund {0} does not exist")]
    RefundNotFound(String),
    #[error("Webhook event {0} has already been recorded")]
    DuplicateEvent(String),
    #[error("The operation timed out. {0}")]
    Timeout(String),
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
}

impl LifecycleError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_) | Self::Timeout(_) | Self::VersionConflict { .. })
    }

    pub fn order_conflict(order_id: &OrderId, expected: i64, actual: i64) -> Self {
        Self::VersionConflict {
            entity: format!("Order {order_id}"),
            expected: format!("version {expected}"),
            actual: format!("version {actual}"),
        }
    }

    pub fn status_conflict<S: ToString>(entity: String, expected: S, actual: S) -> Self {
        Self::VersionConflict { entity, expected: expected.to_string(), actual: actual.to_string() }
    }
}

impl From<sqlx::Error> for LifecycleError {
    fn from(e: sqlx::Error) -> Self {
        LifecycleError::DatabaseError(e.to_string())
    }
}
