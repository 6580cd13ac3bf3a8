//! HTTP server for exposing Prometheus metrics.
//!
//! Serves `/metrics` for Prometheus scraping, `/health` for liveness checks
//! and a small landing page on `/`.

use crate::error::{Result, RubrikError};
use crate::metrics::MetricsCollector;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state.
#[derive(Clone)]
struct AppState {
    metrics: Arc<MetricsCollector>,
}

/// Build the exporter router.
pub fn router(metrics: MetricsCollector) -> Router {
    let state = AppState {
        metrics: Arc::new(metrics),
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves.
///
/// # Arguments
///
/// * `listen_address` - Address to bind to (e.g., "0.0.0.0:9477")
/// * `metrics` - Metrics collector instance
/// * `shutdown` - Future that triggers graceful shutdown when it completes
///
/// # Examples
///
/// ```no_run
/// use rubrik_exporter::client::RubrikClient;
/// use rubrik_exporter::config::Settings;
/// use rubrik_exporter::metrics::MetricsCollector;
/// use rubrik_exporter::server::start_server;
///
/// #[tokio::main]
/// async fn main() {
///     let settings = Settings::load(None).unwrap();
///     let client = RubrikClient::connect(&settings.rubrik).await.unwrap();
///     let metrics = MetricsCollector::new(std::sync::Arc::new(client)).unwrap();
///     start_server("0.0.0.0:9477", metrics, async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await
///     .unwrap();
/// }
/// ```
pub async fn start_server<F>(
    listen_address: &str,
    metrics: MetricsCollector,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(metrics);

    info!("Starting HTTP server on {}", listen_address);

    let listener = TcpListener::bind(listen_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RubrikError::Server(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}

/// Handler for /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    info!("Received metrics scrape request");

    if let Err(e) = state.metrics.collect().await {
        // rubrik_up is already 0, keep serving what we have
        warn!("Failed to collect metrics: {}", e);
    }

    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Handler for root endpoint.
async fn root_handler() -> Response {
    let html = r#"
<!DOCTYPE html>
<html>
<head>
    <title>Rubrik Exporter</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        h1 { color: #333; }
        a { color: #0066cc; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .info { background: #f0f0f0; padding: 15px; border-radius: 5px; margin: 20px 0; }
    </style>
</head>
<body>
    <h1>Rubrik Exporter</h1>
    <div class="info">
        <p>Prometheus metrics exporter for Rubrik CDM clusters</p>
        <p><strong>Endpoints:</strong></p>
        <ul>
            <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
            <li><a href="/health">/health</a> - Health check</li>
        </ul>
    </div>
</body>
</html>
"#;

    (StatusCode::OK, axum::response::Html(html)).into_response()
}
