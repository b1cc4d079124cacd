//! Connection and logging settings shared by Clubhouse binaries.
//!
//! Connection strings are held as [`SecretString`] because they routinely
//! embed credentials, so these structs can be logged with `{:?}`.

use crate::secret::SecretString;
use serde::Deserialize;

/// Postgres pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` URL, possibly with a password
    pub url: SecretString,
    pub max_connections: u32,
}

/// Redis pub/sub settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: SecretString,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `clubhouse_service=info,tower_http=debug`
    pub filter: String,
    /// Emit one JSON object per line instead of human-readable output
    pub json: bool,
}
