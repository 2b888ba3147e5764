//! # Lifecycle APIs
//!
//! The components that callers (the HTTP server, tests) drive. Each is generic over the storage backend `B`, and the
//! gateway-facing ones over the [`crate::traits::PaymentGateway`] implementation `G`:
//!
//! * [`OrderStore`] creates orders and applies versioned status transitions.
//! * [`PaymentCoordinator`] creates, confirms, cancels and synchronises gateway authorizations.
//! * [`RefundCoordinator`] issues refunds within the captured amount.
//! * [`WebhookReconciler`] applies gateway webhook events exactly once, in a valid order.
//! * [`WebhookDispatcher`] bounds the concurrency and duration of webhook processing.
//! * [`MaintenanceApi`] purges expired ledger and idempotency entries.
mod authorization_sync;
mod maintenance_api;
mod order_store;
mod payment_coordinator;
mod refund_coordinator;
mod retry;
mod webhook_dispatcher;
mod webhook_objects;
mod webhook_reconciler;

pub use maintenance_api::MaintenanceApi;
pub use order_store::OrderStore;
pub use payment_coordinator::PaymentCoordinator;
pub use refund_coordinator::RefundCoordinator;
pub use retry::{call_with_retries, RetryPolicy};
pub use webhook_dispatcher::WebhookDispatcher;
pub use webhook_objects::{Ack, EventKind, GatewayEvent, GatewayEventData};
pub use webhook_reconciler::WebhookReconciler;
