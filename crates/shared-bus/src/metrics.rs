//! Metrics hooks for the dispatch core.
//!
//! The worker and the router report through a [`MetricsRecorder`]. The
//! default [`BusMetrics`] keeps atomic counters; implement the trait to feed
//! an external system instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Trait for custom metrics recording implementations.
pub trait MetricsRecorder: Send + Sync {
    /// A request was enqueued on the inbound queue.
    fn record_submitted(&self);

    /// A handler produced a response.
    fn record_handled(&self, duration: Duration);

    /// A request was dropped because no handler claims its type.
    fn record_unroutable(&self);

    /// A handler returned an error or panicked.
    fn record_handler_fault(&self);

    /// A delivery (response or failure notice) was routed to `broadcast`
    /// subscribers and `correlated` waiters.
    fn record_routed(&self, broadcast: usize, correlated: usize);

    /// A broadcast or correlation callback panicked.
    fn record_callback_fault(&self);

    /// A correlation entry expired before its response arrived.
    fn record_timeout(&self);
}

/// Atomic counters for the dispatch core.
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// Requests enqueued.
    pub submitted: AtomicU64,
    /// Responses produced by handlers.
    pub handled: AtomicU64,
    /// Requests without a handler.
    pub unroutable: AtomicU64,
    /// Handler errors and panics.
    pub handler_faults: AtomicU64,
    /// Deliveries drained and routed, responses and failure notices alike.
    pub routed: AtomicU64,
    /// Broadcast callback invocations.
    pub broadcast_deliveries: AtomicU64,
    /// Correlation waiter invocations.
    pub correlated_deliveries: AtomicU64,
    /// Callback panics.
    pub callback_faults: AtomicU64,
    /// Expired correlation entries.
    pub timeouts: AtomicU64,
    /// Cumulative handler time in nanoseconds.
    pub handler_time_ns: AtomicU64,
}

impl BusMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            handler_faults: self.handler_faults.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            broadcast_deliveries: self.broadcast_deliveries.load(Ordering::Relaxed),
            correlated_deliveries: self.correlated_deliveries.load(Ordering::Relaxed),
            callback_faults: self.callback_faults.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            avg_handler_ns: self.avg_handler_time_ns(),
        }
    }

    /// Average handler time in nanoseconds.
    pub fn avg_handler_time_ns(&self) -> u64 {
        let total = self.handler_time_ns.load(Ordering::Relaxed);
        let count = self.handled.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }
}

impl MetricsRecorder for BusMetrics {
    fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_handled(&self, duration: Duration) {
        self.handled.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.handler_time_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    fn record_handler_fault(&self) {
        self.handler_faults.fetch_add(1, Ordering::Relaxed);
    }

    fn record_routed(&self, broadcast: usize, correlated: usize) {
        self.routed.fetch_add(1, Ordering::Relaxed);
        self.broadcast_deliveries
            .fetch_add(broadcast as u64, Ordering::Relaxed);
        self.correlated_deliveries
            .fetch_add(correlated as u64, Ordering::Relaxed);
    }

    fn record_callback_fault(&self) {
        self.callback_faults.fetch_add(1, Ordering::Relaxed);
    }

    fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub handled: u64,
    pub unroutable: u64,
    pub handler_faults: u64,
    pub routed: u64,
    pub broadcast_deliveries: u64,
    pub correlated_deliveries: u64,
    pub callback_faults: u64,
    pub timeouts: u64,
    pub avg_handler_ns: u64,
}

/// No-op metrics recorder for when metrics are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_submitted(&self) {}
    fn record_handled(&self, _duration: Duration) {}
    fn record_unroutable(&self) {}
    fn record_handler_fault(&self) {}
    fn record_routed(&self, _broadcast: usize, _correlated: usize) {}
    fn record_callback_fault(&self) {}
    fn record_timeout(&self) {}
}
