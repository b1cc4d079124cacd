//! HTTP routes for the Clubhouse service.
//!
//! Defines the Axum router and application state.

use crate::auth::JwtValidator;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::services::FanoutService;
use crate::ws::{self, ConnectionRegistry};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Post-write event and mention fan-out.
    pub fanout: FanoutService,

    /// Live WebSocket connections.
    pub registry: ConnectionRegistry,

    /// Validator for user tokens (REST and WebSocket).
    pub jwt_validator: Arc<JwtValidator>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready` - Operational probes - public, unversioned
/// - `/metrics` - Prometheus metrics endpoint - public, unversioned
/// - `/api/v1/ws?token=` - WebSocket upgrade, authenticated by query token
/// - `/api/v1/...` - Posts, comments, reactions, notifications - Bearer auth
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        jwt_validator: state.jwt_validator.clone(),
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Authenticates itself; browsers cannot send headers on upgrade
        .route("/api/v1/ws", get(ws::ws_upgrade))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route(
            "/api/v1/sections/:section_id/posts",
            post(handlers::create_post),
        )
        .route(
            "/api/v1/posts/:id",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route(
            "/api/v1/posts/:id/comments",
            post(handlers::create_comment).get(handlers::list_comments),
        )
        .route(
            "/api/v1/comments/:id",
            axum::routing::patch(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route(
            "/api/v1/posts/:id/reactions/:emoji",
            put(handlers::add_reaction).delete(handlers::remove_reaction),
        )
        .route("/api/v1/notifications", get(handlers::list_notifications))
        .route(
            "/api/v1/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_app_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppState>();
    }
}
