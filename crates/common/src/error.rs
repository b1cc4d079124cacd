//! Infrastructure errors shared across Clubhouse crates.
//!
//! These describe failures of the stores and transports themselves, not of
//! a single request. The service maps them onto HTTP responses at its own
//! error boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClubhouseCommonError {
    /// Postgres unreachable or a statement failed
    #[error("Database error: {0}")]
    Database(String),

    /// Redis publish or pub/sub subscription failed
    #[error("Broker error: {0}")]
    Broker(String),

    /// Event payload could not be encoded or decoded
    #[error("Payload error: {0}")]
    Payload(String),

    /// Setting missing or out of range
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced user, post or comment does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bearer token rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ClubhouseCommonError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Broker(_))
    }
}

impl From<serde_json::Error> for ClubhouseCommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClubhouseCommonError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(ClubhouseCommonError::Broker("connection reset".into()).is_transient());
        assert!(ClubhouseCommonError::Database("pool timed out".into()).is_transient());
        assert!(!ClubhouseCommonError::NotFound("post".into()).is_transient());
        assert!(!ClubhouseCommonError::Payload("eof".into()).is_transient());
    }

    #[test]
    fn test_json_error_becomes_payload() {
        let err: ClubhouseCommonError = serde_json::from_str::<u32>("\"x\"")
            .map_err(ClubhouseCommonError::from)
            .unwrap_err();

        assert!(matches!(err, ClubhouseCommonError::Payload(_)));
        assert!(err.to_string().starts_with("Payload error:"));
    }
}
