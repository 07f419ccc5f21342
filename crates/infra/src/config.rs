//! Engine configuration from `WMS_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use wms_observability::LogFormat;

use crate::retry::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub reservation_ttl: Duration,
    pub sweep_interval: Duration,
    pub retry: RetryPolicy,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            reservation_ttl: Duration::from_secs(900),
            sweep_interval: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "WMS_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(
                &get,
                "WMS_RETRY_BASE_DELAY_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            ..defaults.retry.clone()
        };

        let db_max_connections =
            parse_or(&get, "WMS_DB_MAX_CONNECTIONS", defaults.db_max_connections)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "WMS_DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        let ttl_secs: u64 = parse_or(
            &get,
            "WMS_RESERVATION_TTL_SECS",
            defaults.reservation_ttl.as_secs(),
        )?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "WMS_RESERVATION_TTL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: get("WMS_DATABASE_URL").map(|v| v.trim().to_string()),
            db_max_connections,
            reservation_ttl: Duration::from_secs(ttl_secs),
            sweep_interval: Duration::from_millis(parse_or(
                &get,
                "WMS_SWEEP_INTERVAL_MS",
                defaults.sweep_interval.as_millis() as u64,
            )?),
            retry,
            bind_addr: parse_or(&get, "WMS_BIND_ADDR", defaults.bind_addr)?,
            log_format: parse_or(&get, "WMS_LOG_FORMAT", defaults.log_format)?,
        })
    }

    /// Reservation TTL as the chrono duration the services compute with.
    pub fn reservation_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.reservation_ttl).unwrap_or(chrono::Duration::seconds(900))
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.reservation_ttl, Duration::from_secs(900));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("WMS_DATABASE_URL", "sqlite://warehouse.db"),
            ("WMS_DB_MAX_CONNECTIONS", "8"),
            ("WMS_RESERVATION_TTL_SECS", "60"),
            ("WMS_SWEEP_INTERVAL_MS", "250"),
            ("WMS_RETRY_MAX_ATTEMPTS", "2"),
            ("WMS_RETRY_BASE_DELAY_MS", "5"),
            ("WMS_BIND_ADDR", "127.0.0.1:9000"),
            ("WMS_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite://warehouse.db"));
        assert_eq!(config.db_max_connections, 8);
        assert_eq!(config.reservation_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay, Duration::from_millis(5));
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn malformed_values_name_the_key() {
        let err = EngineConfig::from_lookup(lookup(&[("WMS_SWEEP_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WMS_SWEEP_INTERVAL_MS",
                value: "soon".to_string()
            }
        );

        let err = EngineConfig::from_lookup(lookup(&[("WMS_LOG_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WMS_LOG_FORMAT", .. }));

        let err =
            EngineConfig::from_lookup(lookup(&[("WMS_RESERVATION_TTL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WMS_RESERVATION_TTL_SECS", .. }));
    }
}
