mod idempotency;
mod signature;

pub use idempotency::{idempotency_key, payload_hash, GatewayOperation};
pub use signature::{calculate_hmac, verify_hmac_signature};
