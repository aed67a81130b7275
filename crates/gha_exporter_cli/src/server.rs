//! HTTP exposition of the gauge registry.
//!
//! Serves `GET /metrics` in the Prometheus text format and a trivial
//! `GET /health` probe. The server drains in-flight scrapes when the
//! shutdown signal fires.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use gha_exporter::{ExporterMetrics, Shutdown};

/// Build the exporter router.
pub(crate) fn router(metrics: Arc<ExporterMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<ExporterMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Serve until `shutdown` fires.
pub(crate) async fn serve(
    addr: SocketAddr,
    metrics: Arc<ExporterMetrics>,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Serving metrics on http://{}/metrics", listener.local_addr()?);

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown.stopped().await })
        .await
}
