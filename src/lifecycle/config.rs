//! Service configuration.

use crate::controller::ItemOptionsPolicy;
#[cfg(feature = "postgres")]
use crate::store::PostgresConfig;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for [`OrderSystem`](crate::lifecycle::OrderSystem).
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | ORDER_BUS_CAPACITY | 256 | Buffer size of in-process topics |
/// | ORDER_OUTBOX_BATCH_SIZE | 64 | Outbox rows fetched per drain round |
/// | ORDER_OUTBOX_POLL_INTERVAL_MS | 1000 | Background outbox drain interval |
/// | ORDER_CONSUME_ERROR_PAUSE_MS | 500 | Pause after a failed consume |
/// | ORDER_ITEM_OPTIONS_POLICY | strict | `strict` or `lenient` |
/// | ORDER_SHUTDOWN_TIMEOUT_MS | 10000 | Per-task join timeout on shutdown |
/// | ORDER_DATABASE_URL | unset | PostgreSQL URL (feature `postgres`) |
/// | ORDER_DB_MAX_CONNECTIONS | 10 | Pool size (feature `postgres`) |
/// | ORDER_DB_ACQUIRE_TIMEOUT_MS | 30000 | Pool acquire timeout (feature `postgres`) |
/// | ORDER_DB_IDLE_TIMEOUT_MS | 600000 | Pool idle timeout (feature `postgres`) |
///
/// Unset or unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bus_capacity: usize,
    pub outbox_batch_size: usize,
    pub outbox_poll_interval: Duration,
    pub consume_error_pause: Duration,
    pub item_options_policy: ItemOptionsPolicy,
    pub shutdown_timeout: Duration,
    pub database_url: Option<String>,
    #[cfg(feature = "postgres")]
    pub postgres: PostgresConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let millis =
            |name: &str, default: u64| Duration::from_millis(parsed(name).unwrap_or(default));

        Self {
            bus_capacity: parse_or::<usize>(lookup("ORDER_BUS_CAPACITY"), 256).max(1),
            outbox_batch_size: parse_or::<usize>(lookup("ORDER_OUTBOX_BATCH_SIZE"), 64).max(1),
            outbox_poll_interval: millis("ORDER_OUTBOX_POLL_INTERVAL_MS", 1_000),
            consume_error_pause: millis("ORDER_CONSUME_ERROR_PAUSE_MS", 500),
            item_options_policy: parse_or(
                lookup("ORDER_ITEM_OPTIONS_POLICY"),
                ItemOptionsPolicy::Strict,
            ),
            shutdown_timeout: millis("ORDER_SHUTDOWN_TIMEOUT_MS", 10_000),
            database_url: lookup("ORDER_DATABASE_URL").filter(|url| !url.trim().is_empty()),
            #[cfg(feature = "postgres")]
            postgres: PostgresConfig {
                max_connections: parse_or(lookup("ORDER_DB_MAX_CONNECTIONS"), 10),
                acquire_timeout: millis("ORDER_DB_ACQUIRE_TIMEOUT_MS", 30_000),
                idle_timeout: millis("ORDER_DB_IDLE_TIMEOUT_MS", 600_000),
            },
        }
    }

    pub fn with_item_options_policy(mut self, policy: ItemOptionsPolicy) -> Self {
        self.item_options_policy = policy;
        self
    }

    pub fn with_outbox_poll_interval(mut self, interval: Duration) -> Self {
        self.outbox_poll_interval = interval;
        self
    }

    pub fn with_consume_error_pause(mut self, pause: Duration) -> Self {
        self.consume_error_pause = pause;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.bus_capacity, 256);
        assert_eq!(config.outbox_batch_size, 64);
        assert_eq!(config.outbox_poll_interval, Duration::from_secs(1));
        assert_eq!(config.consume_error_pause, Duration::from_millis(500));
        assert_eq!(config.item_options_policy, ItemOptionsPolicy::Strict);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config(&[
            ("ORDER_OUTBOX_BATCH_SIZE", "8"),
            ("ORDER_ITEM_OPTIONS_POLICY", "LENIENT"),
            ("ORDER_CONSUME_ERROR_PAUSE_MS", "soon"),
            ("ORDER_BUS_CAPACITY", "0"),
            ("ORDER_DATABASE_URL", "postgres://localhost/orders"),
        ]);
        assert_eq!(config.outbox_batch_size, 8);
        assert_eq!(config.item_options_policy, ItemOptionsPolicy::Lenient);
        assert_eq!(config.consume_error_pause, Duration::from_millis(500));
        assert_eq!(config.bus_capacity, 1);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orders"));
    }
}
