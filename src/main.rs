//! merehub - real-time WebSocket hub for room-based chat.
//!
//! Authenticated clients hold one WebSocket session each. Chat messages are
//! checked against room membership, persisted, and fanned out to every
//! connected participant of the room; typing and presence signals are
//! relayed without persistence.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod http;
mod metrics;
mod network;
mod protocol;
mod state;
mod telemetry;

use crate::auth::{Authenticator, JwtAuthenticator, MIN_SECRET_LEN};
use crate::config::Config;
use crate::db::Database;
use crate::network::Gateway;
use crate::state::Hub;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("MEREHUB_LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        path = %config.listen.path,
        "Starting merehub"
    );

    // SECURITY: Refuse to start with a short token secret unless explicitly allowed
    if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        if std::env::var("MEREHUB_ALLOW_WEAK_SECRET").is_ok() {
            warn!(
                min_len = MIN_SECRET_LEN,
                "INSECURE: Running with a short jwt_secret (allowed via MEREHUB_ALLOW_WEAK_SECRET)"
            );
        } else {
            error!(min_len = MIN_SECRET_LEN, "FATAL: auth.jwt_secret is too short");
            error!("  Generate a secure secret with:");
            error!("    openssl rand -hex 32");
            error!("  For testing only, set MEREHUB_ALLOW_WEAK_SECRET=1 to bypass this check.");
            anyhow::bail!("Refusing to start with a weak jwt_secret");
        }
    }

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    info!(path = %config.database.path, "Database ready");

    let auth: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(&config.auth));
    let hub = Hub::new(Arc::new(db), config.session.clone());
    let shutdown = CancellationToken::new();

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(http::run_http_server(metrics_port, shutdown.clone()));
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let gateway = Gateway::bind(config.listen, config.tls, auth, Arc::clone(&hub)).await?;
    let accept_loop = tokio::spawn(gateway.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown.cancel();
    let closed = hub.shutdown();
    if let Err(e) = accept_loop.await {
        warn!(error = %e, "Gateway task failed");
    }
    info!(sessions = closed, "merehub stopped");

    Ok(())
}
