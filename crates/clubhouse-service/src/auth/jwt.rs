//! JWT validation for user tokens.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted; the key is the configured shared secret
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Generic error messages prevent information leakage

use crate::auth::claims::{AuthenticatedUser, Claims};
use crate::errors::ClubhouseError;
use common::jwt::{ensure_issued_in_past, ensure_token_size};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Why a token was rejected.
///
/// The WebSocket upgrade reports these with distinct close codes; REST routes
/// collapse both into a generic 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    Invalid,
}

impl TokenRejection {
    /// WebSocket close code sent when the upgrade token is rejected.
    pub fn close_code(self) -> u16 {
        match self {
            TokenRejection::Expired => 4001,
            TokenRejection::Invalid => 4002,
        }
    }
}

impl From<TokenRejection> for ClubhouseError {
    fn from(_: TokenRejection) -> Self {
        ClubhouseError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
    }
}

/// JWT validator for HS256 user tokens.
pub struct JwtValidator {
    decoding_key: DecodingKey,

    /// Clock skew tolerance in seconds for iat validation.
    clock_skew_seconds: i64,
}

impl JwtValidator {
    /// Create a new JWT validator.
    ///
    /// # Arguments
    ///
    /// * `secret` - Shared HS256 secret
    /// * `clock_skew_seconds` - Clock skew tolerance for iat validation
    pub fn new(secret: &[u8], clock_skew_seconds: i64) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            clock_skew_seconds,
        }
    }

    /// Validate a JWT and return the authenticated user.
    ///
    /// # Checks
    ///
    /// 1. Size check, before any decoding
    /// 2. Verify HS256 signature
    /// 3. Validate exp claim (reject expired tokens)
    /// 4. Validate iat claim with clock skew tolerance
    /// 5. Parse `sub` into a user id
    #[instrument(skip_all, name = "clubhouse.auth.validate")]
    pub fn validate(&self, token: &str) -> Result<AuthenticatedUser, TokenRejection> {
        ensure_token_size(token).map_err(|e| {
            tracing::debug!(target: "clubhouse.auth.jwt", error = ?e, "Token size check failed");
            TokenRejection::Invalid
        })?;

        let claims = self.verify_token(token)?;

        // Safe cast: bounded by MAX_CLOCK_SKEW at config load
        let skew = Duration::from_secs(self.clock_skew_seconds.max(0) as u64);
        if let Err(e) = ensure_issued_in_past(claims.iat, skew) {
            tracing::debug!(target: "clubhouse.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(TokenRejection::Invalid);
        }

        let user_id = claims.user_id().map_err(|e| {
            tracing::debug!(target: "clubhouse.auth.jwt", error = ?e, "Token subject rejected");
            TokenRejection::Invalid
        })?;

        tracing::debug!(target: "clubhouse.auth.jwt", "Token validated successfully");
        Ok(AuthenticatedUser {
            user_id,
            username: claims.username,
        })
    }

    fn verify_token(&self, token: &str) -> Result<Claims, TokenRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                tracing::debug!(target: "clubhouse.auth.jwt", error = %e, "Token verification failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenRejection::Expired,
                    _ => TokenRejection::Invalid,
                }
            })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::jwt::MAX_TOKEN_BYTES;
    use common::types::UserId;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    const SECRET: &[u8] = b"unit-test-secret-0123456789abcdef";

    fn sign(claims: &Claims, secret: &[u8]) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn claims(sub: String, exp_offset: i64, iat_offset: i64) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub,
            exp: now + exp_offset,
            iat: now + iat_offset,
            username: Some("alice".to_string()),
        }
    }

    fn validator() -> JwtValidator {
        JwtValidator::new(SECRET, 300)
    }

    #[test]
    fn test_valid_token_yields_user() {
        let id = Uuid::new_v4();
        let token = sign(&claims(format!("user:{id}"), 3600, 0), SECRET);

        let user = validator().validate(&token).unwrap();
        assert_eq!(user.user_id, UserId(id));
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_expired_token_is_reported_as_expired() {
        let token = sign(&claims(Uuid::new_v4().to_string(), -3600, -7200), SECRET);

        assert_eq!(
            validator().validate(&token).unwrap_err(),
            TokenRejection::Expired
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = sign(
            &claims(Uuid::new_v4().to_string(), 3600, 0),
            b"some-other-secret-0123456789abcdef",
        );

        assert_eq!(
            validator().validate(&token).unwrap_err(),
            TokenRejection::Invalid
        );
    }

    #[test]
    fn test_future_iat_is_invalid() {
        let token = sign(&claims(Uuid::new_v4().to_string(), 7200, 3600), SECRET);

        assert_eq!(
            validator().validate(&token).unwrap_err(),
            TokenRejection::Invalid
        );
    }

    #[test]
    fn test_non_user_subject_is_invalid() {
        let token = sign(&claims("service:relay".to_string(), 3600, 0), SECRET);

        assert_eq!(
            validator().validate(&token).unwrap_err(),
            TokenRejection::Invalid
        );
    }

    #[test]
    fn test_oversized_token_is_invalid() {
        let token = "a".repeat(MAX_TOKEN_BYTES + 1);
        assert_eq!(
            validator().validate(&token).unwrap_err(),
            TokenRejection::Invalid
        );
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert_eq!(
            validator().validate("not.a.jwt").unwrap_err(),
            TokenRejection::Invalid
        );
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(TokenRejection::Expired.close_code(), 4001);
        assert_eq!(TokenRejection::Invalid.close_code(), 4002);
    }

    #[test]
    fn test_rejection_maps_to_generic_401() {
        let err: ClubhouseError = TokenRejection::Expired.into();
        assert_eq!(err.status_code(), 401);
        assert!(err.to_string().contains(INVALID_TOKEN_MESSAGE));
    }
}
