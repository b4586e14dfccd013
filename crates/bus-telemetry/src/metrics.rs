//! Prometheus metrics for the message bus.
//!
//! All metrics follow the naming convention: `bus_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: requests submitted, handled, dropped; deliveries; faults
//! - **Histogram**: handler execution time

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use shared_bus::MetricsRecorder;
use std::time::Duration;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();
}

/// [`MetricsRecorder`] backed by Prometheus collectors.
#[derive(Clone)]
pub struct PrometheusMetrics {
    submitted: IntCounter,
    handled: IntCounter,
    handler_duration: Histogram,
    unroutable: IntCounter,
    handler_faults: IntCounter,
    routed: IntCounter,
    deliveries: IntCounterVec,
    callback_faults: IntCounter,
    timeouts: IntCounter,
}

impl PrometheusMetrics {
    /// Create the collectors and register them with the global [`REGISTRY`].
    ///
    /// Fails if called twice in one process.
    pub fn register() -> Result<Self, TelemetryError> {
        Self::register_in(&REGISTRY)
    }

    /// Create the collectors and register them with `registry`.
    pub fn register_in(registry: &Registry) -> Result<Self, TelemetryError> {
        let metrics = Self {
            submitted: IntCounter::new(
                "bus_requests_submitted_total",
                "Requests enqueued on the inbound queue",
            )
            .map_err(init_error)?,

            handled: IntCounter::new(
                "bus_requests_handled_total",
                "Requests for which a handler produced a response",
            )
            .map_err(init_error)?,

            handler_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "bus_handler_duration_seconds",
                    "Time spent inside request handlers",
                )
                .buckets(exponential_buckets(0.00001, 2.0, 15).map_err(init_error)?),
            )
            .map_err(init_error)?,

            unroutable: IntCounter::new(
                "bus_requests_unroutable_total",
                "Requests dropped because no handler claims their type",
            )
            .map_err(init_error)?,

            handler_faults: IntCounter::new(
                "bus_handler_faults_total",
                "Handler errors and panics",
            )
            .map_err(init_error)?,

            routed: IntCounter::new(
                "bus_router_deliveries_routed_total",
                "Responses and failure notices drained from the outbound queue",
            )
            .map_err(init_error)?,

            deliveries: IntCounterVec::new(
                Opts::new(
                    "bus_router_callback_invocations_total",
                    "Callbacks invoked by the router",
                ),
                &["path"], // path: broadcast/correlated
            )
            .map_err(init_error)?,

            callback_faults: IntCounter::new(
                "bus_router_callback_faults_total",
                "Broadcast and correlation callbacks that panicked",
            )
            .map_err(init_error)?,

            timeouts: IntCounter::new(
                "bus_router_correlation_timeouts_total",
                "Correlation entries that expired before a response arrived",
            )
            .map_err(init_error)?,
        };

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.submitted.clone()),
            Box::new(metrics.handled.clone()),
            Box::new(metrics.handler_duration.clone()),
            Box::new(metrics.unroutable.clone()),
            Box::new(metrics.handler_faults.clone()),
            Box::new(metrics.routed.clone()),
            Box::new(metrics.deliveries.clone()),
            Box::new(metrics.callback_faults.clone()),
            Box::new(metrics.timeouts.clone()),
        ];

        for collector in collectors {
            registry.register(collector).map_err(init_error)?;
        }

        Ok(metrics)
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn record_submitted(&self) {
        self.submitted.inc();
    }

    fn record_handled(&self, duration: Duration) {
        self.handled.inc();
        self.handler_duration.observe(duration.as_secs_f64());
    }

    fn record_unroutable(&self) {
        self.unroutable.inc();
    }

    fn record_handler_fault(&self) {
        self.handler_faults.inc();
    }

    fn record_routed(&self, broadcast: usize, correlated: usize) {
        self.routed.inc();
        self.deliveries
            .with_label_values(&["broadcast"])
            .inc_by(broadcast as u64);
        self.deliveries
            .with_label_values(&["correlated"])
            .inc_by(correlated as u64);
    }

    fn record_callback_fault(&self) {
        self.callback_faults.inc();
    }

    fn record_timeout(&self) {
        self.timeouts.inc();
    }
}

fn init_error(e: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsInit(e.to_string())
}

/// Encode the global registry in Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

/// Encode `registry` in Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
