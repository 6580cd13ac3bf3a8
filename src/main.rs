use anyhow::{Context, Result};
use clap::Parser;
use rubrik_exporter::{
    client::RubrikClient, config::Settings, metrics::MetricsCollector, server::start_server,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Rubrik Exporter - Prometheus metrics exporter for Rubrik CDM clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "RUBRIK_EXPORTER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("failed to load configuration")?;

    init_logging(&settings.exporter.log_level, &settings.exporter.log_format);

    info!("Starting Rubrik Exporter");
    info!("Rubrik endpoint: {}", settings.rubrik.endpoint);
    info!("Listen address: {}", settings.exporter.listen_address);

    let client = RubrikClient::connect(&settings.rubrik)
        .await
        .context("failed to authenticate with Rubrik")?;
    info!("Rubrik client initialized");

    let client = Arc::new(client);
    let metrics = MetricsCollector::new(client.clone())?;
    info!("Metrics collector initialized");

    let served = start_server(&settings.exporter.listen_address, metrics, shutdown_signal()).await;

    client.logout().await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Rubrik Exporter stopped");
    Ok(())
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}

/// Initialize structured logging with tracing.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(log_level: &str, log_format: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
