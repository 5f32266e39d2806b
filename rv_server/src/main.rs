//! Rental backend server.
//!
//! Boots the database pool, constructs the auth core and device broker,
//! and serves the HTTP/WebSocket API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use ctrlc::set_handler;
use rentiva::auth::{
    AccessTokenManager, LogOnlySender, OtpAuthenticator, PermissionStore, SessionManager,
    TokenKey,
};
use rentiva::db::Database;
use rentiva::device::DeviceBroker;
use rentiva::store::PgBusinessStore;

use rv_server::{api, config::ServerConfig, logging, metrics};

const HELP: &str = "\
Run the rental backend server

USAGE:
  rv_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  APP_ENV                  development | production
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  METRICS_BIND             Prometheus exporter bind address (optional)
  DATABASE_URL             PostgreSQL connection string
  ACCESS_TOKEN_KEY         Access token secret (required in production)
  SESSION_TOKEN_KEY        Session token secret (required in production)
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override)
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind)
            .map_err(|e| anyhow::anyhow!("Metrics error: {e}"))?;
        tracing::info!("Prometheus metrics on {metrics_bind}");
    }

    tracing::info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {e}"))?;
    let pool = Arc::new(db.pool().clone());
    tracing::info!("Database connected successfully");

    // Auth core: distinct keys per token family.
    let access_tokens = Arc::new(AccessTokenManager::new(
        TokenKey::derive(&config.security.access_token_key),
        config.auth.access_token_ttl_minutes,
    ));
    let sessions = Arc::new(SessionManager::new(
        pool.clone(),
        TokenKey::derive(&config.security.session_token_key),
        config.auth.session_ttl_hours,
        config.auth.session_extension_hours,
    ));
    let otp = Arc::new(OtpAuthenticator::new(
        pool.clone(),
        Arc::new(LogOnlySender),
        config.auth.otp_expiry_minutes,
        access_tokens.as_ref().clone(),
        sessions.as_ref().clone(),
    ));
    let permissions = Arc::new(PermissionStore::new(pool.clone()));
    let business = Arc::new(PgBusinessStore::new(pool.clone()));
    let devices = Arc::new(DeviceBroker::new(Duration::from_millis(
        config.auth.device_response_timeout_ms,
    )));

    let state = api::AppState {
        access_tokens,
        sessions,
        otp,
        permissions,
        business,
        devices,
        pool,
    };

    let app = api::create_router(state);

    tracing::info!("Starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {e}", config.bind))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    tracing::info!("Shutting down server...");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
