//! HMAC signatures for gateway webhooks.
//!
//! The gateway signs every webhook delivery with the shared secret: the signature header carries the base64-encoded
//! HMAC-SHA256 of the raw request body.
use hmac::{Hmac, Mac};
use log::trace;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Calculates the base64-encoded HMAC-SHA256 of `data` under `secret`.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::default(),
    };
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Verifies `header` against the HMAC of `payload`. The comparison is constant-time.
pub fn verify_hmac_signature(secret: &str, payload: &[u8], header: &str) -> bool {
    if secret.is_empty() {
        trace!("🔐️ No webhook secret is configured. Refusing to validate the signature.");
        return false;
    }
    let Ok(signature) = base64::decode(header.trim()) else {
        trace!("🔐️ Signature header is not valid base64");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}
