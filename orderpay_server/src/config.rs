//! Server configuration.
//!
//! Everything is read from `OPY_*` environment variables once at start-up. Invalid values are logged and replaced
//! with defaults so that a misconfigured server still starts and says what is wrong.
use std::{env, time::Duration};

use log::*;
use orderpay_common::{env_duration_secs, env_or_default, parse_boolean_flag, Secret};
use orderpay_engine::EngineConfig;

const DEFAULT_OPY_HOST: &str = "127.0.0.1";
const DEFAULT_OPY_PORT: u16 = 8360;
const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub gateway: GatewayConfig,
    /// How often expired webhook ledger entries and idempotency records are purged.
    pub maintenance_interval: Duration,
    /// If true, every request is written to the `opy::access_log` log target.
    pub access_log: bool,
    pub engine: EngineConfig,
}

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Base URL of the gateway's REST API, e.g. "https://api.gateway.example/v1"
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Bound on a single HTTP round trip to the gateway
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OPY_HOST.to_string(),
            port: DEFAULT_OPY_PORT,
            database_url: String::default(),
            gateway: GatewayConfig::default(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            access_log: true,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("OPY_HOST").ok().unwrap_or_else(|| DEFAULT_OPY_HOST.into());
        let port = env_or_default("OPY_PORT", DEFAULT_OPY_PORT);
        let database_url = env::var("OPY_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ OPY_DATABASE_URL is not set. Please set it to the URL for the OrderPay database.");
            String::default()
        });
        let engine = EngineConfig::from_env_or_default();
        let gateway = GatewayConfig::from_env_or_default(engine.gateway_timeout);
        let mut maintenance_interval = env_duration_secs("OPY_MAINTENANCE_INTERVAL", DEFAULT_MAINTENANCE_INTERVAL);
        if maintenance_interval.is_zero() {
            warn!("🪛️ OPY_MAINTENANCE_INTERVAL cannot be zero. Using {}s.", DEFAULT_MAINTENANCE_INTERVAL.as_secs());
            maintenance_interval = DEFAULT_MAINTENANCE_INTERVAL;
        }
        let access_log = parse_boolean_flag(env::var("OPY_ACCESS_LOG").ok(), true);
        Self { host, port, database_url, gateway, maintenance_interval, access_log, engine }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default(timeout: Duration) -> Self {
        let base_url = env::var("OPY_GATEWAY_URL").ok().unwrap_or_else(|| {
            error!("🪛️ OPY_GATEWAY_URL is not set. Every payment request will fail until it is configured.");
            String::default()
        });
        let api_key = env::var("OPY_GATEWAY_API_KEY").ok().unwrap_or_else(|| {
            warn!("🪛️ OPY_GATEWAY_API_KEY is not set. Gateway requests will be sent without credentials.");
            String::default()
        });
        Self { base_url: base_url.trim_end_matches('/').to_string(), api_key: Secret::new(api_key), timeout }
    }
}
