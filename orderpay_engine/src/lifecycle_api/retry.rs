use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::traits::GatewayError;

/// Exponential backoff settings for gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Mutating calls are capped at one retry regardless of this value.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff: Duration::from_millis(100), max_backoff: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Default::default() }
    }

    /// The policy for calls with side effects. These present the same idempotency key on every attempt, and are
    /// retried at most once.
    pub fn for_mutation(&self) -> Self {
        Self { max_retries: self.max_retries.min(1), ..*self }
    }

    /// Backoff before retry number `attempt` (0-based), doubling each time and capped at `max_backoff`, with up to
    /// 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let backoff = self.initial_backoff.saturating_mul(factor).min(self.max_backoff);
        let jitter_ms = (backoff.as_millis() as u64) / 4;
        let jitter = if jitter_ms > 0 { rand::thread_rng().gen_range(0..=jitter_ms) } else { 0 };
        backoff + Duration::from_millis(jitter)
    }
}

/// Runs `f` under `timeout`, retrying transient failures according to `policy`. Non-transient errors are returned
/// immediately.
pub async fn call_with_retries<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    mut f: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(timeout, f()).await {
            Ok(r) => r,
            Err(_) => Err(GatewayError::Timeout),
        };
        match result {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let wait = policy.backoff(attempt);
                attempt += 1;
                warn!("🔄️ Gateway call {label} failed ({e}). Retry {attempt}/{} in {wait:?}", policy.max_retries);
                tokio::time::sleep(wait).await;
            },
            Err(e) => return Err(e),
        }
    }
}
