//! Test server harness for E2E testing
//!
//! Provides `TestClubhouseServer` for spawning real Clubhouse server
//! instances in tests. The database is real (from `#[sqlx::test]`); the
//! broker is a [`MockBroker`] so published events can be inspected.

use crate::token_builders::TestTokenBuilder;
use clubhouse_service::auth::JwtValidator;
use clubhouse_service::config::Config;
use clubhouse_service::observability::metrics::init_metrics_recorder;
use clubhouse_service::repositories::{PgMentionRecorder, PgUserLookup};
use clubhouse_service::routes::{self, AppState};
use clubhouse_service::services::broker::mock::{MockBroker, PublishedMessage};
use clubhouse_service::services::{
    Broker, EventPublisher, FanoutService, MentionRecorder, MentionResolver, UserLookup,
};
use clubhouse_service::ws::ConnectionRegistry;
use common::types::UserId;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long [`TestClubhouseServer::wait_for_published`] polls.
const PUBLISH_WAIT: Duration = Duration::from_secs(5);

/// Global metrics handle for test servers.
///
/// The Prometheus recorder can only be installed once per process.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the Clubhouse server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_health(pool: PgPool) -> Result<()> {
///     let server = TestClubhouseServer::spawn(pool).await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestClubhouseServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    broker: Arc<MockBroker>,
    registry: ConnectionRegistry,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestClubhouseServer {
    /// Spawn a new test server instance with isolated database.
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(pool, HashMap::new()).await
    }

    /// Spawn with extra configuration variables (e.g. `MENTIONS_ENABLED`).
    pub async fn spawn_with_vars(
        pool: PgPool,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "JWT_SECRET".to_string(),
                crate::token_builders::TEST_JWT_SECRET.to_string(),
            ),
            (
                "CLUBHOUSE_INSTANCE_ID".to_string(),
                "clubhouse-test".to_string(),
            ),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let shutdown = CancellationToken::new();
        let broker = Arc::new(MockBroker::new());
        let registry = ConnectionRegistry::new();

        let publisher = EventPublisher::new(Some(broker.clone() as Arc<dyn Broker>));
        let resolver = if config.mentions_enabled {
            MentionResolver::new(Some(
                Arc::new(PgUserLookup::new(pool.clone())) as Arc<dyn UserLookup>
            ))
        } else {
            MentionResolver::disabled()
        };
        let recorder: Arc<dyn MentionRecorder> = Arc::new(PgMentionRecorder::new(pool.clone()));
        let fanout = FanoutService::new(
            publisher,
            resolver,
            Some(recorder),
            shutdown.clone(),
            config.fanout_timeout,
        );

        let jwt_validator = Arc::new(JwtValidator::new(
            config.jwt_secret_bytes(),
            config.jwt_clock_skew_seconds,
        ));

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            fanout,
            registry: registry.clone(),
            jwt_validator,
        });

        let app = routes::build_routes(state, test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            broker,
            registry,
            shutdown,
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL carrying `token` as the query parameter.
    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The broker every event is published to.
    pub fn broker(&self) -> &MockBroker {
        &self.broker
    }

    /// The server's live WebSocket connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// A valid token for `user_id`.
    pub fn token_for(&self, user_id: UserId) -> String {
        TestTokenBuilder::new().for_user(user_id).sign()
    }

    /// Wait until at least `count` messages have been published on `channel`.
    ///
    /// Fan-out runs after the response is sent, so tests poll for it.
    pub async fn wait_for_published(&self, channel: &str, count: usize) -> Vec<PublishedMessage> {
        let deadline = tokio::time::Instant::now() + PUBLISH_WAIT;
        loop {
            let published = self.broker.published_on(channel);
            if published.len() >= count || tokio::time::Instant::now() >= deadline {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestClubhouseServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self._handle.abort();
    }
}
