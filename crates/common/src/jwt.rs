//! Algorithm-independent checks for Clubhouse user tokens.
//!
//! Signature verification lives in the service. The checks here run around
//! it: a size gate before any decoding, an `iat` sanity check after, and
//! mapping the `sub` claim onto a [`UserId`].
//!
//! Every rejection renders the same message so a caller cannot tell which
//! check failed. The reason is logged at debug level under `common.jwt`.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::types::UserId;

/// Largest token accepted, in bytes. HS256 user tokens are well under 1KB.
pub const MAX_TOKEN_BYTES: usize = 4096;

/// How far in the future `iat` may be before the token is refused.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound for a configured clock skew.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Prefix some issuers put in front of the user id in `sub`.
pub const USER_SUBJECT_PREFIX: &str = "user:";

const GENERIC_REJECTION: &str = "The access token is invalid or expired";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("{}", GENERIC_REJECTION)]
    Oversized,

    #[error("{}", GENERIC_REJECTION)]
    IssuedInFuture,

    #[error("{}", GENERIC_REJECTION)]
    InvalidSubject,
}

/// Refuse tokens longer than [`MAX_TOKEN_BYTES`] before decoding them.
///
/// # Errors
///
/// `JwtValidationError::Oversized` when the token is too long.
pub fn ensure_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() <= MAX_TOKEN_BYTES {
        return Ok(());
    }
    tracing::debug!(
        target: "common.jwt",
        token_bytes = token.len(),
        limit = MAX_TOKEN_BYTES,
        "Rejecting oversized token"
    );
    Err(JwtValidationError::Oversized)
}

/// Refuse tokens whose `iat` lies more than `clock_skew` ahead of now.
///
/// # Errors
///
/// `JwtValidationError::IssuedInFuture` when `iat` is beyond the skew window.
pub fn ensure_issued_in_past(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    ensure_issued_before(iat, clock_skew, chrono::Utc::now().timestamp())
}

fn ensure_issued_before(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let latest = now.saturating_add(skew);
    if iat <= latest {
        return Ok(());
    }
    tracing::debug!(
        target: "common.jwt",
        iat,
        now,
        skew_secs = skew,
        "Rejecting token issued in the future"
    );
    Err(JwtValidationError::IssuedInFuture)
}

/// Read the user id out of a `sub` claim.
///
/// Both `<uuid>` and `user:<uuid>` are accepted.
///
/// # Errors
///
/// `JwtValidationError::InvalidSubject` for anything else.
pub fn parse_user_subject(sub: &str) -> Result<UserId, JwtValidationError> {
    let raw = sub.strip_prefix(USER_SUBJECT_PREFIX).unwrap_or(sub);
    Uuid::parse_str(raw).map(UserId).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Rejecting token with non-user subject");
        JwtValidationError::InvalidSubject
    })
}
