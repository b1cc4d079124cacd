//! Clubhouse Service
//!
//! Entry point for the Clubhouse real-time API.
//!
//! # Startup
//!
//! 1. Load configuration
//! 2. Initialize tracing and the Prometheus recorder
//! 3. Connect to PostgreSQL (with statement timeout)
//! 4. Connect to Redis, if configured, and start the event relay
//! 5. Serve HTTP/WebSocket until SIGINT/SIGTERM
//!
//! # Shutdown
//!
//! The shutdown token is cancelled first, which stops the relay and ends
//! in-flight fan-out scopes. Open sockets are closed, then the drain period
//! runs before the server exits.

use clubhouse_service::auth::JwtValidator;
use clubhouse_service::config::{Config, DEFAULT_LOG_FILTER};
use clubhouse_service::observability::metrics::init_metrics_recorder;
use clubhouse_service::repositories::{PgMentionRecorder, PgUserLookup};
use clubhouse_service::routes::{self, AppState};
use clubhouse_service::services::{
    Broker, EventPublisher, FanoutService, MentionRecorder, MentionResolver, RedisBroker,
    UserLookup,
};
use clubhouse_service::tasks::start_event_relay;
use clubhouse_service::ws::ConnectionRegistry;
use common::config::LogConfig;
use common::secret::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first; it carries the log settings
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config.log);

    info!("Starting Clubhouse service");
    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        broker_enabled = config.redis.is_some(),
        mentions_enabled = config.mentions_enabled,
        fanout_timeout_ms = config.fanout_timeout.as_millis() as u64,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    // Initialize database connection pool with query timeout
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(config.database.url.expose_secret(), 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    let shutdown_token = CancellationToken::new();
    let registry = ConnectionRegistry::new();

    // Broker is optional; without it publishing is a no-op
    let broker = match &config.redis {
        Some(redis) => {
            info!("Connecting to Redis...");
            let broker = RedisBroker::connect(redis.url.expose_secret()).await?;
            info!("Redis connection established");
            Some(broker)
        }
        None => {
            warn!("REDIS_URL not set, event publishing disabled");
            None
        }
    };

    let relay_handle = broker.as_ref().map(|broker| {
        tokio::spawn(start_event_relay(
            broker.client().clone(),
            registry.clone(),
            shutdown_token.child_token(),
        ))
    });

    let publisher = EventPublisher::new(broker.map(|b| Arc::new(b) as Arc<dyn Broker>));
    let resolver = if config.mentions_enabled {
        MentionResolver::new(Some(
            Arc::new(PgUserLookup::new(db_pool.clone())) as Arc<dyn UserLookup>
        ))
    } else {
        MentionResolver::disabled()
    };
    let recorder: Arc<dyn MentionRecorder> = Arc::new(PgMentionRecorder::new(db_pool.clone()));
    let fanout = FanoutService::new(
        publisher,
        resolver,
        Some(recorder),
        shutdown_token.clone(),
        config.fanout_timeout,
    );

    let jwt_validator = Arc::new(JwtValidator::new(
        config.jwt_secret_bytes(),
        config.jwt_clock_skew_seconds,
    ));

    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState {
        pool: db_pool,
        config,
        fanout,
        registry: registry.clone(),
        jwt_validator,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Clubhouse service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_token = shutdown_token.clone();
    let server_registry = registry.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        server_token.cancel();
        server_registry.close_all();
        drain().await;
    })
    .await?;

    shutdown_token.cancel();
    if let Some(handle) = relay_handle {
        let _ = handle.await;
    }

    info!("Clubhouse service shutdown complete");

    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_new(&log.filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Graceful shutdown drain period.
async fn drain() {
    let drain_secs: u64 = std::env::var("CLUBHOUSE_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (CLUBHOUSE_DRAIN_SECONDS=0)");
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
