//! Engine configuration.
//!
//! [`EngineConfig`] is constructed once (usually with [`EngineConfig::from_env_or_default`]) and handed to each API
//! that needs it. There is no global configuration state.
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use once_cell::sync::Lazy;
use orderpay_common::{env_duration_secs, env_or_default, MinorUnits, Secret};
use regex::Regex;

use crate::{lifecycle_api::RetryPolicy, traits::LifecycleError};

pub const DEFAULT_CURRENCIES: &str = "USD,EUR,GBP";
pub const DEFAULT_MIN_AMOUNT: i64 = 50;
pub const DEFAULT_MAX_AMOUNT: i64 = 99_999_999;
pub const DEFAULT_IDEMPOTENCY_KEY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_WEBHOOK_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WEBHOOK_WORKERS: usize = 8;
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{3}$").expect("Invalid currency code pattern"));

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper-case ISO 4217 codes that orders and payments may use
    pub supported_currencies: Vec<String>,
    pub min_amount: MinorUnits,
    pub max_amount: MinorUnits,
    /// Shared secret used to verify webhook signatures
    pub webhook_secret: Secret<String>,
    /// How long a cached gateway response is reused for a repeated idempotency key
    pub idempotency_key_ttl: Duration,
    /// How long webhook ledger entries are kept before they are purged
    pub webhook_retention: Duration,
    pub retry: RetryPolicy,
    /// Bound on every individual gateway call
    pub gateway_timeout: Duration,
    /// Maximum number of webhook events processed concurrently
    pub webhook_workers: usize,
    pub webhook_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supported_currencies: parse_currencies(DEFAULT_CURRENCIES),
            min_amount: MinorUnits::from(DEFAULT_MIN_AMOUNT),
            max_amount: MinorUnits::from(DEFAULT_MAX_AMOUNT),
            webhook_secret: Secret::default(),
            idempotency_key_ttl: DEFAULT_IDEMPOTENCY_KEY_TTL,
            webhook_retention: DEFAULT_WEBHOOK_RETENTION,
            retry: RetryPolicy::default(),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            webhook_workers: DEFAULT_WEBHOOK_WORKERS,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn new(webhook_secret: &str) -> Self {
        Self { webhook_secret: Secret::new(webhook_secret.to_string()), ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let currencies = env_or_default("OPY_SUPPORTED_CURRENCIES", DEFAULT_CURRENCIES.to_string());
        let supported_currencies = parse_currencies(&currencies);
        if supported_currencies.is_empty() {
            error!("🪛️ OPY_SUPPORTED_CURRENCIES contains no valid currency codes. Every payment will be rejected.");
        }
        let webhook_secret = std::env::var("OPY_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ OPY_WEBHOOK_SECRET is not set. Webhook deliveries will fail signature verification.");
            String::default()
        });
        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: env_or_default("OPY_GATEWAY_MAX_RETRIES", default_retry.max_retries),
            initial_backoff: Duration::from_millis(env_or_default(
                "OPY_GATEWAY_INITIAL_BACKOFF_MS",
                default_retry.initial_backoff.as_millis() as u64,
            )),
            max_backoff: Duration::from_millis(env_or_default(
                "OPY_GATEWAY_MAX_BACKOFF_MS",
                default_retry.max_backoff.as_millis() as u64,
            )),
        };
        let mut webhook_workers = env_or_default("OPY_WEBHOOK_WORKERS", DEFAULT_WEBHOOK_WORKERS);
        if webhook_workers == 0 {
            warn!("🪛️ OPY_WEBHOOK_WORKERS must be at least 1. Using {DEFAULT_WEBHOOK_WORKERS}.");
            webhook_workers = DEFAULT_WEBHOOK_WORKERS;
        }
        let mut config = Self {
            supported_currencies,
            min_amount: MinorUnits::from(env_or_default("OPY_MIN_AMOUNT", DEFAULT_MIN_AMOUNT)),
            max_amount: MinorUnits::from(env_or_default("OPY_MAX_AMOUNT", DEFAULT_MAX_AMOUNT)),
            webhook_secret: Secret::new(webhook_secret),
            idempotency_key_ttl: env_duration_secs("OPY_IDEMPOTENCY_KEY_TTL", DEFAULT_IDEMPOTENCY_KEY_TTL),
            webhook_retention: env_duration_secs("OPY_WEBHOOK_RETENTION", DEFAULT_WEBHOOK_RETENTION),
            retry,
            gateway_timeout: env_duration_secs("OPY_GATEWAY_TIMEOUT", DEFAULT_GATEWAY_TIMEOUT),
            webhook_workers,
            webhook_timeout: env_duration_secs("OPY_WEBHOOK_TIMEOUT", DEFAULT_WEBHOOK_TIMEOUT),
        };
        if config.min_amount > config.max_amount {
            warn!(
                "🪛️ OPY_MIN_AMOUNT ({}) is larger than OPY_MAX_AMOUNT ({}). Reverting to the default bounds.",
                config.min_amount, config.max_amount
            );
            config.min_amount = MinorUnits::from(DEFAULT_MIN_AMOUNT);
            config.max_amount = MinorUnits::from(DEFAULT_MAX_AMOUNT);
        }
        config
    }

    /// Normalises `currency` to upper case and checks that it is a 3-letter code on the allow-list.
    pub fn validate_currency(&self, currency: &str) -> Result<String, LifecycleError> {
        let currency = normalize_currency(currency)?;
        if self.supported_currencies.contains(&currency) {
            Ok(currency)
        } else {
            Err(LifecycleError::ValidationError(format!("Currency {currency} is not supported")))
        }
    }

    /// Checks that a payment amount lies within the configured bounds.
    pub fn validate_amount(&self, amount: MinorUnits) -> Result<(), LifecycleError> {
        if amount < self.min_amount || amount > self.max_amount {
            return Err(LifecycleError::ValidationError(format!(
                "Amount {amount} is outside the permitted range of {} to {}",
                self.min_amount, self.max_amount
            )));
        }
        Ok(())
    }
}

/// The point in time `age` before `now`. Ages too large to represent reach back to the earliest representable time.
pub fn cutoff_before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age).ok().and_then(|d| now.checked_sub_signed(d)).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Upper-cases `currency` after checking that it looks like an ISO 4217 code.
pub fn normalize_currency(currency: &str) -> Result<String, LifecycleError> {
    let currency = currency.trim();
    if CURRENCY_CODE.is_match(currency) {
        Ok(currency.to_ascii_uppercase())
    } else {
        Err(LifecycleError::ValidationError(format!("{currency} is not a 3-letter currency code")))
    }
}

fn parse_currencies(s: &str) -> Vec<String> {
    s.split(',')
        .filter_map(|c| match normalize_currency(c) {
            Ok(c) => Some(c),
            Err(_) => {
                warn!("🪛️ Ignoring invalid currency code '{c}' in OPY_SUPPORTED_CURRENCIES");
                None
            },
        })
        .collect()
}
