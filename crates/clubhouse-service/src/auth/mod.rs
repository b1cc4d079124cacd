//! Authentication for user-facing routes.
//!
//! User tokens are HS256 JWTs signed with the shared secret from
//! configuration. REST routes carry them as `Authorization: Bearer`, the
//! WebSocket upgrade carries them as a `?token=` query parameter.
//!
//! # Components
//!
//! - `claims` - JWT claims structure and the authenticated user extension
//! - `jwt` - Signature, expiry and issued-at validation

pub mod claims;
pub mod jwt;

pub use claims::{AuthenticatedUser, Claims};
pub use jwt::{JwtValidator, TokenRejection};
