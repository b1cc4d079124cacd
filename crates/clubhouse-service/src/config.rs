//! Clubhouse service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::config::{DatabaseConfig, LogConfig, RedisConfig};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default fan-out timeout in milliseconds.
pub const DEFAULT_FANOUT_TIMEOUT_MS: u64 = 2000;

/// Upper bound for the fan-out timeout in milliseconds.
pub const MAX_FANOUT_TIMEOUT_MS: u64 = 30_000;

/// Minimum length of the HS256 signing secret in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Default size of the database pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

/// Largest accepted database pool.
pub const MAX_DB_MAX_CONNECTIONS: u32 = 500;

/// Tracing filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "clubhouse_service=info,tower_http=info";

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "clubhouse";

/// Clubhouse service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Connection strings and the JWT secret are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection settings.
    pub database: DatabaseConfig,

    /// Broker connection settings. `None` disables event publishing.
    pub redis: Option<RedisConfig>,

    /// Log filter and format.
    pub log: LogConfig,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Shared HS256 secret used to verify user tokens.
    pub jwt_secret: SecretString,

    /// JWT clock skew tolerance in seconds for token validation.
    pub jwt_clock_skew_seconds: i64,

    /// When false, mention resolution is a no-op.
    pub mentions_enabled: bool,

    /// Deadline applied to each fan-out run.
    pub fanout_timeout: Duration,

    /// Unique identifier for this instance, reported by `/health`.
    pub instance_id: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database", &self.database)
            .field("redis", &self.redis)
            .field("log", &self.log)
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("mentions_enabled", &self.mentions_enabled)
            .field("fanout_timeout", &self.fanout_timeout)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("JWT_SECRET must be at least {} bytes", MIN_JWT_SECRET_BYTES)]
    WeakJwtSecret,

    #[error("{key} must be an integer in {min}..={max}, got {value:?}")]
    OutOfRange {
        key: &'static str,
        value: String,
        min: u64,
        max: u64,
    },

    #[error("{key} must be true or false, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;

        let jwt_secret = required(vars, "JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::WeakJwtSecret);
        }

        let max_connections = bounded(
            vars,
            "DB_MAX_CONNECTIONS",
            u64::from(DEFAULT_DB_MAX_CONNECTIONS),
            1..=u64::from(MAX_DB_MAX_CONNECTIONS),
        )?;

        let jwt_clock_skew_seconds = bounded(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            1..=MAX_CLOCK_SKEW.as_secs(),
        )?;

        let fanout_timeout_ms = bounded(
            vars,
            "FANOUT_TIMEOUT_MS",
            DEFAULT_FANOUT_TIMEOUT_MS,
            1..=MAX_FANOUT_TIMEOUT_MS,
        )?;

        let redis = vars
            .get("REDIS_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| RedisConfig {
                url: SecretString::from(url.clone()),
            });

        let log = LogConfig {
            filter: vars
                .get("RUST_LOG")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json: vars
                .get("LOG_FORMAT")
                .is_some_and(|format| format.eq_ignore_ascii_case("json")),
        };

        let instance_id = match vars.get("CLUBHOUSE_INSTANCE_ID") {
            Some(id) => id.clone(),
            None => {
                let host = vars.get("HOSTNAME").map_or("unknown", String::as_str);
                let nonce = uuid::Uuid::new_v4().simple().to_string();
                format!(
                    "{DEFAULT_INSTANCE_ID_PREFIX}-{host}-{}",
                    nonce.get(..8).unwrap_or_default()
                )
            }
        };

        Ok(Config {
            database: DatabaseConfig {
                url: SecretString::from(database_url.to_string()),
                // Bounded above by MAX_DB_MAX_CONNECTIONS
                max_connections: u32::try_from(max_connections)
                    .unwrap_or(MAX_DB_MAX_CONNECTIONS),
            },
            redis,
            log,
            bind_address: vars
                .get("BIND_ADDRESS")
                .cloned()
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            jwt_secret: SecretString::from(jwt_secret.to_string()),
            jwt_clock_skew_seconds: i64::try_from(jwt_clock_skew_seconds).unwrap_or(i64::MAX),
            mentions_enabled: parse_bool(vars, "MENTIONS_ENABLED", true)?,
            fanout_timeout: Duration::from_millis(fanout_timeout_ms),
            instance_id,
        })
    }

    /// Raw bytes of the JWT secret, for building signing/verification keys.
    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }
}

fn required<'a>(
    vars: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    vars.get(key)
        .map(String::as_str)
        .ok_or(ConfigError::Missing(key))
}

/// Parse an optional integer, falling back to `default` when unset.
fn bounded(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = vars.get(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if range.contains(&value) => Ok(value),
        _ => Err(ConfigError::OutOfRange {
            key,
            value: raw.clone(),
            min: *range.start(),
            max: *range.end(),
        }),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = vars.get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.clone(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

    fn vars(extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/clubhouse_test".to_string(),
            ),
            ("JWT_SECRET".to_string(), TEST_SECRET.to_string()),
        ]);
        for (key, value) in extra {
            vars.insert((*key).to_string(), (*value).to_string());
        }
        vars
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&vars(&[])).unwrap();

        assert_eq!(
            config.database.url.expose_secret(),
            "postgresql://localhost/clubhouse_test"
        );
        assert_eq!(config.database.max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(config.redis.is_none());
        assert_eq!(config.jwt_clock_skew_seconds, 300);
        assert!(config.mentions_enabled);
        assert_eq!(config.fanout_timeout, Duration::from_secs(2));
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
        assert!(!config.log.json);
        assert!(config.instance_id.starts_with("clubhouse-unknown-"));
        assert_eq!(config.jwt_secret_bytes(), TEST_SECRET.as_bytes());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(&vars(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("JWT_CLOCK_SKEW_SECONDS", "120"),
            ("MENTIONS_ENABLED", "off"),
            ("FANOUT_TIMEOUT_MS", "500"),
            ("DB_MAX_CONNECTIONS", "5"),
            ("LOG_FORMAT", "JSON"),
            ("CLUBHOUSE_INSTANCE_ID", "clubhouse-custom-001"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(
            config.redis.as_ref().map(|r| r.url.expose_secret()),
            Some("redis://localhost:6379")
        );
        assert_eq!(config.jwt_clock_skew_seconds, 120);
        assert!(!config.mentions_enabled);
        assert_eq!(config.fanout_timeout, Duration::from_millis(500));
        assert_eq!(config.database.max_connections, 5);
        assert!(config.log.json);
        assert_eq!(config.instance_id, "clubhouse-custom-001");
    }

    #[test]
    fn test_blank_redis_url_disables_broker() {
        let config = Config::from_vars(&vars(&[("REDIS_URL", "  ")])).unwrap();
        assert!(config.redis.is_none());
    }

    #[test]
    fn test_required_vars() {
        for key in ["DATABASE_URL", "JWT_SECRET"] {
            let mut vars = vars(&[]);
            vars.remove(key);
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::Missing(k)) if k == key),
                "{key} should be required"
            );
        }
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let result = Config::from_vars(&vars(&[("JWT_SECRET", "too-short")]));
        assert!(matches!(result, Err(ConfigError::WeakJwtSecret)));
    }

    #[test]
    fn test_numeric_bounds() {
        let rejected = [
            ("JWT_CLOCK_SKEW_SECONDS", "0"),
            ("JWT_CLOCK_SKEW_SECONDS", "601"),
            ("JWT_CLOCK_SKEW_SECONDS", "five-minutes"),
            ("FANOUT_TIMEOUT_MS", "0"),
            ("FANOUT_TIMEOUT_MS", "30001"),
            ("FANOUT_TIMEOUT_MS", "-5"),
            ("DB_MAX_CONNECTIONS", "0"),
        ];
        for (key, value) in rejected {
            let result = Config::from_vars(&vars(&[(key, value)]));
            assert!(
                matches!(&result, Err(ConfigError::OutOfRange { key: k, .. }) if *k == key),
                "{key}={value} should be rejected"
            );
        }

        let config = Config::from_vars(&vars(&[
            ("FANOUT_TIMEOUT_MS", "30000"),
            ("JWT_CLOCK_SKEW_SECONDS", "600"),
        ]))
        .unwrap();
        assert_eq!(config.fanout_timeout, Duration::from_secs(30));
        assert_eq!(config.jwt_clock_skew_seconds, 600);
    }

    #[test]
    fn test_out_of_range_message_names_the_variable() {
        let err = Config::from_vars(&vars(&[("FANOUT_TIMEOUT_MS", "0")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "FANOUT_TIMEOUT_MS must be an integer in 1..=30000, got \"0\""
        );
    }

    #[test]
    fn test_mentions_enabled_rejects_garbage() {
        let result = Config::from_vars(&vars(&[("MENTIONS_ENABLED", "maybe")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidBool { key, .. }) if key == "MENTIONS_ENABLED")
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config =
            Config::from_vars(&vars(&[("REDIS_URL", "redis://:hunter2@cache:6379")])).unwrap();

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains(TEST_SECRET));
    }
}
