use serde::Deserialize;
use std::env;

/// Tunables for the operation lifecycle.
///
/// `idle_operation_timeout_ms` follows the sign convention of
/// `Operation::is_timed_out`: 0 disables eviction, positive evicts idle
/// terminal operations, negative (force mode) evicts wedged non-terminal
/// operations too.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_idle_operation_timeout_ms")]
    pub idle_operation_timeout_ms: i64,
    #[serde(default = "default_long_poll_timeout_ms")]
    pub long_poll_timeout_ms: u64,
    #[serde(default = "default_reaper_period_ms")]
    pub reaper_period_ms: u64,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

const fn default_idle_operation_timeout_ms() -> i64 {
    3_600_000
}
const fn default_long_poll_timeout_ms() -> u64 {
    5_000
}
const fn default_reaper_period_ms() -> u64 {
    60_000
}
const fn default_worker_pool_size() -> usize {
    8
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            idle_operation_timeout_ms: default_idle_operation_timeout_ms(),
            long_poll_timeout_ms: default_long_poll_timeout_ms(),
            reaper_period_ms: default_reaper_period_ms(),
            worker_pool_size: default_worker_pool_size(),
        }
    }
}

/// Server process configuration from GRIDSQL_* environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub service: ServiceConfig,
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let service = ServiceConfig {
            idle_operation_timeout_ms: env_parse(
                "GRIDSQL_IDLE_OPERATION_TIMEOUT_MS",
                default_idle_operation_timeout_ms(),
            ),
            long_poll_timeout_ms: env_parse(
                "GRIDSQL_LONG_POLL_TIMEOUT_MS",
                default_long_poll_timeout_ms(),
            ),
            reaper_period_ms: env_parse("GRIDSQL_REAPER_PERIOD_MS", default_reaper_period_ms()),
            worker_pool_size: env_parse("GRIDSQL_WORKER_POOL_SIZE", default_worker_pool_size()),
        };
        Self {
            host: env::var("GRIDSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("GRIDSQL_PORT", 7432),
            service,
        }
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
