//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus scraping.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Run the HTTP server for Prometheus metrics until `shutdown` fires.
///
/// Binds to `0.0.0.0:port` and serves the `/metrics` endpoint.
pub async fn run_http_server(port: u16, shutdown: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics HTTP server");
            return;
        }
    };
    tracing::info!(%addr, "Prometheus HTTP server listening");

    let result = axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server error");
    }
}
