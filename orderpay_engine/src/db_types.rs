use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use orderpay_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Generates `Display`, `FromStr` and a lenient `From<String>` for a status enum. The string forms are the
/// SCREAMING_SNAKE_CASE names that are also stored in the database.
macro_rules! status_strings {
    ($name:ident, $fallback:ident, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $s)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($s => Ok(Self::$variant),)+
                    other => Err(ConversionError::new(stringify!($name), other)),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!(
                        "Invalid {}: {value}. But this conversion cannot fail. Defaulting to {}",
                        stringify!($name),
                        Self::$fallback
                    );
                    Self::$fallback
                })
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn random() -> Self {
        Self(format!("ord_{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been created, and no payment has been attempted.
    Pending,
    /// A gateway authorization exists for the order and is awaiting its outcome.
    Authorizing,
    /// The authorization succeeded and the funds are captured.
    Paid,
    Shipped,
    Delivered,
    /// The order was cancelled by the user, or its authorization was cancelled.
    Cancelled,
    /// The authorization failed.
    Failed,
    /// The captured amount was refunded in full.
    Refunded,
}

status_strings!(OrderStatusType, Pending, {
    Pending => "PENDING",
    Authorizing => "AUTHORIZING",
    Paid => "PAID",
    Shipped => "SHIPPED",
    Delivered => "DELIVERED",
    Cancelled => "CANCELLED",
    Failed => "FAILED",
    Refunded => "REFUNDED",
});

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 8] = [
        Self::Pending,
        Self::Authorizing,
        Self::Paid,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
        Self::Failed,
        Self::Refunded,
    ];

    /// The order transition table.
    ///
    /// | From        | To                               |
    /// |-------------|----------------------------------|
    /// | Pending     | Authorizing, Cancelled           |
    /// | Authorizing | Paid, Failed, Cancelled          |
    /// | Paid        | Shipped, Cancelled, Refunded     |
    /// | Shipped     | Delivered, Refunded              |
    ///
    /// Every other edge, including a status to itself, is forbidden.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (Pending, Authorizing | Cancelled) |
                (Authorizing, Paid | Failed | Cancelled) |
                (Paid, Shipped | Cancelled | Refunded) |
                (Shipped, Delivered | Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Failed | Self::Refunded)
    }

    /// Orders in these states hold captured funds.
    pub fn is_captured(&self) -> bool {
        matches!(self, Self::Paid | Self::Shipped | Self::Delivered)
    }
}

//--------------------------------------       UserRole        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Seller,
}

impl Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Buyer => write!(f, "buyer"),
            UserRole::Seller => write!(f, "seller"),
        }
    }
}

impl FromStr for UserRole {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            other => Err(ConversionError::new("UserRole", other)),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: OrderStatusType,
    pub authorization_id: Option<String>,
    /// Optimistic concurrency token. Incremented on every status transition.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub buyer_id: String,
    pub seller_id: String,
    pub product_id: String,
    /// The order total, in minor units of `currency`
    pub amount: MinorUnits,
    /// ISO 4217 code. Normalised to upper case before it is stored.
    pub currency: String,
}

impl NewOrder {
    pub fn new(buyer_id: &str, seller_id: &str, product_id: &str, amount: MinorUnits, currency: &str) -> Self {
        Self {
            buyer_id: buyer_id.to_string(),
            seller_id: seller_id.to_string(),
            product_id: product_id.to_string(),
            amount,
            currency: currency.to_string(),
        }
    }
}

//--------------------------------------   OrderTransition     ---------------------------------------------------------
/// A request to move an order to `new_status`, guarded by the caller's last-known `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransition {
    pub order_id: OrderId,
    pub expected_version: i64,
    pub new_status: OrderStatusType,
    /// Sets `Order.authorization_id` as part of the transition
    pub authorization_id: Option<String>,
}

impl OrderTransition {
    pub fn new(order_id: OrderId, expected_version: i64, new_status: OrderStatusType) -> Self {
        Self { order_id, expected_version, new_status, authorization_id: None }
    }

    pub fn for_order(order: &Order, new_status: OrderStatusType) -> Self {
        Self::new(order.id.clone(), order.version, new_status)
    }

    pub fn with_authorization_id(mut self, authorization_id: &str) -> Self {
        self.authorization_id = Some(authorization_id.to_string());
        self
    }
}

//--------------------------------------  OrderStatusChange    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub order_id: OrderId,
    /// The order version *after* the change
    pub version: i64,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
    pub changed_at: DateTime<Utc>,
}

//-------------------------------------- AuthorizationStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    RequiresConfirmation,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

status_strings!(AuthorizationStatus, RequiresConfirmation, {
    RequiresConfirmation => "REQUIRES_CONFIRMATION",
    Processing => "PROCESSING",
    Succeeded => "SUCCEEDED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl AuthorizationStatus {
    pub fn can_transition_to(&self, next: AuthorizationStatus) -> bool {
        use AuthorizationStatus::*;
        matches!(
            (self, next),
            (RequiresConfirmation, Processing | Succeeded | Failed | Cancelled) |
                (Processing, Succeeded | Failed | Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::RequiresConfirmation | Self::Processing)
    }

    /// The order status that a terminal authorization status implies, if any.
    pub fn order_status(&self) -> Option<OrderStatusType> {
        match self {
            Self::Succeeded => Some(OrderStatusType::Paid),
            Self::Failed => Some(OrderStatusType::Failed),
            Self::Cancelled => Some(OrderStatusType::Cancelled),
            Self::RequiresConfirmation | Self::Processing => None,
        }
    }
}

//--------------------------------------     Authorization     ---------------------------------------------------------
/// The local projection of a gateway authorization. The gateway remains authoritative.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,
    pub order_id: OrderId,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: AuthorizationStatus,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuthorization {
    /// The authorization id as assigned by the gateway
    pub id: String,
    pub order_id: OrderId,
    pub amount: MinorUnits,
    pub currency: String,
    pub client_secret: Option<String>,
    pub idempotency_key: String,
}

/// A conditional authorization status change, with its cascading order transition and (for webhook deliveries) the
/// ledger entry. Backends apply all three in one atomic unit.
#[derive(Debug, Clone)]
pub struct AuthorizationUpdate {
    pub authorization_id: String,
    pub expected_status: AuthorizationStatus,
    pub new_status: AuthorizationStatus,
    pub order_transition: Option<OrderTransition>,
    pub ledger_entry: Option<NewWebhookEvent>,
}

//--------------------------------------      RefundStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Requested,
    Succeeded,
    Failed,
    Cancelled,
}

status_strings!(RefundStatus, Requested, {
    Requested => "REQUESTED",
    Succeeded => "SUCCEEDED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl RefundStatus {
    pub const ALL: [RefundStatus; 4] = [Self::Requested, Self::Succeeded, Self::Failed, Self::Cancelled];

    pub fn can_transition_to(&self, next: RefundStatus) -> bool {
        matches!((self, next), (Self::Requested, Self::Succeeded | Self::Failed | Self::Cancelled))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Requested)
    }
}

//--------------------------------------         Refund        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub gateway_refund_id: Option<String>,
    pub authorization_id: String,
    pub amount: MinorUnits,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub id: String,
    pub authorization_id: String,
    /// When `None`, the full remaining refundable amount is used
    pub amount: Option<MinorUnits>,
    pub reason: String,
}

impl NewRefund {
    pub fn new(authorization_id: &str, amount: Option<MinorUnits>, reason: &str) -> Self {
        Self {
            id: format!("rf_{:016x}", rand::random::<u64>()),
            authorization_id: authorization_id.to_string(),
            amount,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundUpdate {
    pub refund_id: String,
    pub expected_status: RefundStatus,
    pub new_status: RefundStatus,
    pub ledger_entry: Option<NewWebhookEvent>,
}

//--------------------------------------     WebhookEvent      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    /// The event's effects were applied
    Applied,
    /// The event was accepted, but its effects were not applied (no-op or impossible transition)
    Discarded,
}

status_strings!(EventOutcome, Applied, {
    Applied => "APPLIED",
    Discarded => "DISCARDED",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload_hash: String,
    pub outcome: EventOutcome,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload_hash: String,
    pub outcome: EventOutcome,
}

//--------------------------------------   IdempotencyRecord   ---------------------------------------------------------
/// A cached gateway response for a mutating call, keyed by its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Pagination       ---------------------------------------------------------
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page selection. The limit is clamped to `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page: page.max(1), limit: limit.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self { items, page: pagination.page, limit: pagination.limit, total }
    }
}
