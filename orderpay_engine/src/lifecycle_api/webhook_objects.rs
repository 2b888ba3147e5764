use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::db_types::{AuthorizationStatus, RefundStatus};

/// A webhook delivery from the payment gateway.
///
/// ```json
/// {"id": "evt_123", "type": "authorization.succeeded", "created": 1735689600, "data": {"object_id": "auth_123"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp of the event on the gateway
    pub created: i64,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEventData {
    /// The gateway's id for the authorization or refund
    pub object_id: String,
}

impl GatewayEvent {
    pub fn new(id: &str, kind: EventKind, object_id: &str) -> Self {
        Self {
            id: id.to_string(),
            event_type: kind.to_string(),
            created: chrono::Utc::now().timestamp(),
            data: GatewayEventData { object_id: object_id.to_string() },
        }
    }

    pub fn kind(&self) -> Result<EventKind, String> {
        self.event_type.parse()
    }
}

/// The entity and target status that an event type refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Authorization(AuthorizationStatus),
    Refund(RefundStatus),
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization.processing" => Ok(Self::Authorization(AuthorizationStatus::Processing)),
            "authorization.succeeded" => Ok(Self::Authorization(AuthorizationStatus::Succeeded)),
            "authorization.failed" => Ok(Self::Authorization(AuthorizationStatus::Failed)),
            "authorization.cancelled" => Ok(Self::Authorization(AuthorizationStatus::Cancelled)),
            "refund.succeeded" => Ok(Self::Refund(RefundStatus::Succeeded)),
            "refund.failed" => Ok(Self::Refund(RefundStatus::Failed)),
            "refund.cancelled" => Ok(Self::Refund(RefundStatus::Cancelled)),
            other => Err(format!("Unknown event type: {other}")),
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authorization(s) => write!(f, "authorization.{}", s.to_string().to_ascii_lowercase()),
            Self::Refund(s) => write!(f, "refund.{}", s.to_string().to_ascii_lowercase()),
        }
    }
}

/// The acknowledgement returned to the gateway. All three are successful deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    /// The event's effects were applied
    Applied,
    /// The event was already processed
    Duplicate,
    /// The event was recorded, but repeated the current state or described an impossible transition
    Discarded,
}

impl Display for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}
