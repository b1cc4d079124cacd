//! Middleware for the Clubhouse service.
//!
//! # Components
//!
//! - `auth` - Authentication middleware for protected routes
//! - `http_metrics` - Request/response metrics for every route

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
