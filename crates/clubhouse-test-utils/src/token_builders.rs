//! Builder for signed test tokens.
//!
//! Tokens are HS256 with the same shared secret the test server is
//! configured with.

use chrono::{Duration, Utc};
use common::types::UserId;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

/// Shared secret used by [`crate::TestClubhouseServer`].
pub const TEST_JWT_SECRET: &str = "clubhouse-test-secret-at-least-32-bytes";

/// Builder for user tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user(alice)
///     .with_username("alice")
///     .expires_in(3600)
///     .sign();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    username: Option<String>,
    exp: i64,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: UserId::new().to_string(),
            username: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Set the subject user.
    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.sub = user_id.to_string();
        self
    }

    /// Set a raw subject, for malformed-subject cases.
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the username claim.
    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired token).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp.
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Build the claims as a JSON value.
    pub fn build(&self) -> serde_json::Value {
        let mut claims = json!({
            "sub": self.sub,
            "exp": self.exp,
            "iat": self.iat,
        });
        if let Some(username) = &self.username {
            claims["username"] = json!(username);
        }
        claims
    }

    /// Sign with [`TEST_JWT_SECRET`].
    pub fn sign(&self) -> String {
        self.sign_with(TEST_JWT_SECRET.as_bytes())
    }

    /// Sign with an arbitrary secret.
    pub fn sign_with(&self, secret: &[u8]) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &self.build(),
            &EncodingKey::from_secret(secret),
        )
        .expect("HS256 encoding of test claims cannot fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
