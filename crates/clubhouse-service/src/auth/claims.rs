//! JWT claims structure.
//!
//! Contains the claims extracted from validated JWTs. The `sub` field is
//! redacted in Debug output to prevent exposure in logs.

use common::jwt::{parse_user_subject, JwtValidationError};
use common::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JWT Claims structure for validated user tokens.
///
/// The `sub` field holds the user identifier, either a bare UUID or
/// `user:<uuid>`. A custom Debug implementation redacts it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Username at issue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Custom Debug implementation that redacts the `sub` field.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("username", &self.username)
            .finish()
    }
}

impl Claims {
    /// Parse the subject into a user id.
    pub fn user_id(&self) -> Result<UserId, JwtValidationError> {
        parse_user_subject(&self.sub)
    }
}

/// The caller of an authenticated request.
///
/// Inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: Option<String>,
}
