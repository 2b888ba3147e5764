use std::fmt::Display;

use blake2::{digest::consts::U32, Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// The mutating gateway operations that carry an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    CreateAuthorization,
    ConfirmAuthorization,
    CreateRefund,
}

impl Display for GatewayOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateAuthorization => write!(f, "create_authorization"),
            Self::ConfirmAuthorization => write!(f, "confirm_authorization"),
            Self::CreateRefund => write!(f, "create_refund"),
        }
    }
}

/// Derives the idempotency key for `operation` on `entity_id`. The same pair always yields the same key, so a retried
/// operation is deduplicated by the gateway.
pub fn idempotency_key(entity_id: &str, operation: GatewayOperation) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(operation.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(entity_id.as_bytes());
    format!("opy_{}", hex::encode(hasher.finalize()))
}

/// Hex-encoded Blake2b-256 digest of a raw webhook payload.
pub fn payload_hash(payload: &[u8]) -> String {
    hex::encode(Blake2b256::digest(payload))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keys_are_deterministic_and_distinct() {
        let a = idempotency_key("ord_1", GatewayOperation::CreateAuthorization);
        assert_eq!(a, idempotency_key("ord_1", GatewayOperation::CreateAuthorization));
        assert_ne!(a, idempotency_key("ord_1", GatewayOperation::ConfirmAuthorization));
        assert_ne!(a, idempotency_key("ord_2", GatewayOperation::CreateAuthorization));
        assert!(a.starts_with("opy_"));
        assert_eq!(a.len(), 4 + 64);
    }

    #[test]
    fn payload_hashes() {
        assert_eq!(payload_hash(b"abc"), payload_hash(b"abc"));
        assert_ne!(payload_hash(b"abc"), payload_hash(b"abd"));
    }
}
