//! # Clubhouse Test Utilities
//!
//! Shared test utilities for the Clubhouse service.
//!
//! This crate provides:
//! - Server test harness (`TestClubhouseServer` for E2E tests)
//! - HS256 token builder (`TestTokenBuilder`)
//! - Database fixtures (users, sections)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clubhouse_test_utils::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: PgPool) -> Result<()> {
//!     let alice = create_user(&pool, "alice").await?;
//!     let server = TestClubhouseServer::spawn(pool).await?;
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/notifications", server.url()))
//!         .bearer_auth(server.token_for(alice))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use token_builders::*;
