//! Clubhouse Service Library
//!
//! Real-time side of the Clubhouse discussion platform:
//!
//! - Posts, comments and reactions over a REST API
//! - `@username` mentions, resolved to users and persisted as notifications
//! - Event fan-out to a pub/sub broker with bounded retry
//! - Per-user WebSocket delivery of mention events (last-connection-wins)
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//!                                       |
//!                                       +-> broker (Redis) -> tasks/event_relay -> ws/registry
//! ```
//!
//! # Modules
//!
//! - `auth` - HS256 user token validation
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics middleware
//! - `models` - Rows, API bodies and event payloads
//! - `observability` - Prometheus metrics
//! - `repositories` - PostgreSQL access
//! - `routes` - Axum router setup
//! - `services` - Mentions, channels, events, fan-out
//! - `tasks` - Background tasks
//! - `ws` - WebSocket endpoint and connection registry

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
pub mod ws;
