//! # Backend and gateway contracts
//!
//! This module defines the interfaces that storage *backends* and the external payment gateway must implement to be
//! driven by the lifecycle engine.
//!
//! * [`OrderManagement`] stores orders and enforces the order transition table and version checks.
//! * [`PaymentManagement`] stores the local projection of gateway authorizations.
//! * [`RefundManagement`] stores refunds and enforces the refund ceiling.
//! * [`WebhookLedger`] and [`IdempotencyManagement`] hold the dedup ledger and cached gateway responses.
//! * [`PaymentGateway`] is the narrow boundary to the external gateway.
//!
//! [`LifecycleDatabase`] bundles the storage traits, and is implemented for every type that implements all of them.
mod data_objects;
mod errors;
mod order_management;
mod payment_gateway;
mod payment_management;
mod refund_management;
mod webhook_ledger;

pub use data_objects::{
    AuthorizationUpdateResult,
    OrderStats,
    PurgeResult,
    RefundStats,
    RefundTotals,
    RefundUpdateResult,
};
pub use errors::LifecycleError;
pub use order_management::OrderManagement;
pub use payment_gateway::{
    CreateAuthorizationRequest,
    CreateRefundRequest,
    GatewayAuthorization,
    GatewayError,
    GatewayRefund,
    PaymentGateway,
};
pub use payment_management::PaymentManagement;
pub use refund_management::RefundManagement;
pub use webhook_ledger::{IdempotencyManagement, WebhookLedger};

/// Everything the lifecycle APIs need from a storage backend.
pub trait LifecycleDatabase:
    OrderManagement + PaymentManagement + RefundManagement + WebhookLedger + IdempotencyManagement
{
}

impl<T> LifecycleDatabase for T where T: OrderManagement + PaymentManagement + RefundManagement + WebhookLedger + IdempotencyManagement
{}
