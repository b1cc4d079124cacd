//! Secret wrappers for values that must never reach logs.
//!
//! Re-exports [`secrecy`] types. `SecretString` redacts itself in `Debug`,
//! so structs that derive `Debug` stay safe to log, and reading the value
//! takes an explicit `expose_secret()`.
//!
//! In Clubhouse this covers the HS256 signing secret and bearer tokens held
//! outside the request that carried them.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let secret = SecretString::from("signing-secret");
//! assert!(!format!("{secret:?}").contains("signing-secret"));
//! assert_eq!(secret.expose_secret(), "signing-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
