//! # Client Runtime Binary
//!
//! 1. Initialize telemetry (tracing subscriber)
//! 2. Load configuration (file or environment)
//! 3. Register Prometheus metrics
//! 4. Build the runtime and run frames until the limit or Ctrl+C
//! 5. Shut down the game systems and the bus

use std::sync::Arc;

use anyhow::{Context, Result};
use bus_telemetry::{gather_metrics, init_telemetry, PrometheusMetrics, TelemetryConfig};
use client_runtime::{ClientRuntime, RuntimeConfig};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let mut telemetry = TelemetryConfig::from_env();
    if std::env::var("BUS_SERVICE_NAME").is_err() {
        telemetry.service_name = "client-runtime".to_string();
    }
    let _telemetry = init_telemetry(telemetry).context("failed to initialize telemetry")?;

    let config = RuntimeConfig::load().context("failed to load runtime configuration")?;
    let metrics = PrometheusMetrics::register().context("failed to register metrics")?;

    let mut runtime = ClientRuntime::new(config, Arc::new(metrics))?;

    info!("Client is running. Press Ctrl+C to stop.");
    tokio::select! {
        _ = runtime.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received");
        }
    }

    runtime.shutdown();

    let stats = runtime.stats();
    info!(
        frames = runtime.frames(),
        account = ?stats.account,
        box_level = ?stats.box_level,
        pongs = stats.pongs_received,
        "Client runtime stopped"
    );
    match gather_metrics() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }

    Ok(())
}
