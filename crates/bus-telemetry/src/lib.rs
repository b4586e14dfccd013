//! # Bus Telemetry
//!
//! Logging and metrics for processes that host a message bus.
//!
//! ## Components
//!
//! - **Tracing**: global `tracing-subscriber` registry with an `EnvFilter`
//!   and a pretty or JSON console layer
//! - **Metrics**: [`PrometheusMetrics`], a bus metrics recorder backed by a
//!   process-wide Prometheus registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bus_telemetry::{init_telemetry, PrometheusMetrics, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! let metrics = Arc::new(PrometheusMetrics::register()?);
//! let bus = MessageBus::builder().metrics(metrics).start()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BUS_SERVICE_NAME` | `message-bus` | Service name in the startup log |
//! | `BUS_LOG_LEVEL` | `RUST_LOG`, then `info` | Log filter directives |
//! | `BUS_JSON_LOGS` | `false` | JSON instead of pretty output |
//! | `BUS_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{encode_registry, gather_metrics, PrometheusMetrics, REGISTRY};
pub use tracing_setup::{env_filter, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install the global tracing subscriber.
///
/// Returns a guard to hold for the lifetime of the application. Calling this
/// twice in one process returns `SubscriberInit`.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let tracing_guard = tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        tracing: tracing_guard,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.tracing.service_name(), "Shutting down telemetry...");
    }
}
