//! OrderPay Engine
//!
//! The engine tracks orders through their lifecycle, drives payment authorizations against an external payment
//! gateway, issues refunds, and reconciles the gateway's asynchronous webhook events with local state.
//!
//! The library is divided into three main sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend). The traits describe what a backend must provide, including the
//!    atomicity guarantees the lifecycle relies on. [`SqliteDatabase`] implements all of them. The data types stored
//!    in the database are defined in [`mod@db_types`] and are public.
//! 2. The lifecycle APIs ([`OrderStore`], [`PaymentCoordinator`], [`RefundCoordinator`], [`WebhookReconciler`] and
//!    friends). These are what callers use; you should never need to touch the database directly.
//! 3. The gateway boundary ([`traits::PaymentGateway`]). The engine knows nothing about the gateway beyond this trait.
//!
//! The engine also emits events when orders are paid or annulled and when refunds settle. See [`mod@events`] for how
//! to hook into them.
pub mod config;
mod db;
pub mod db_types;
pub mod events;
pub mod helpers;
mod lifecycle_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::EngineConfig;
#[cfg(feature = "sqlite")]
pub use db::sqlite::{db::SqliteDatabase, SqliteDatabaseError};
pub use lifecycle_api::{
    call_with_retries,
    Ack,
    EventKind,
    GatewayEvent,
    GatewayEventData,
    MaintenanceApi,
    OrderStore,
    PaymentCoordinator,
    RefundCoordinator,
    RetryPolicy,
    WebhookDispatcher,
    WebhookReconciler,
};
