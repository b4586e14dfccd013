//! # Error Taxonomy
//!
//! - [`ConfigurationError`]: fatal at startup, the worker never starts.
//! - [`ResponseError`]: what a correlation waiter observes instead of a
//!   response. Cloneable because one outcome may reach several waiters.
//!
//! Handler faults and callback faults are contained where they happen and
//! only surface here as [`ResponseError::HandlerFailed`] or as log lines.

use shared_types::{CorrelationId, TypeTag};
use std::time::Duration;
use thiserror::Error;

/// Startup-time wiring or configuration mistakes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Two handlers claimed the same request type.
    #[error("request type {request} is already bound to {existing}, cannot bind {rejected}")]
    DuplicateHandler {
        request: &'static str,
        existing: &'static str,
        rejected: &'static str,
    },

    /// A request type declared as required has no handler.
    #[error("no handler bound for required request type {request}")]
    MissingHandler { request: &'static str },

    /// A configuration value is out of range.
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),

    /// The dispatch worker thread could not be spawned.
    #[error("failed to spawn dispatch worker: {0}")]
    WorkerSpawn(String),
}

/// Outcome delivered to a correlation waiter when no usable response exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The result was read before the future completed.
    #[error("response for correlation {correlation_id} has not arrived yet")]
    NotCompleted { correlation_id: CorrelationId },

    /// No handler is registered for the request type.
    #[error("no handler registered for request type {request}")]
    Unroutable { request: TypeTag },

    /// The handler returned an error or panicked.
    #[error("handler for {request} failed: {reason}")]
    HandlerFailed { request: TypeTag, reason: String },

    /// The deadline passed before a response arrived.
    #[error("correlation {correlation_id} timed out after {waited:?}")]
    TimedOut {
        correlation_id: CorrelationId,
        waited: Duration,
    },

    /// A response arrived but its type is not the one the waiter expected.
    #[error("expected response type {expected}, received {actual}")]
    TypeMismatch { expected: TypeTag, actual: TypeTag },

    /// The dispatch worker is gone; the request was never enqueued.
    #[error("dispatch worker is not running")]
    Disconnected,
}

impl ResponseError {
    /// Whether this outcome came from reading a future too early.
    #[must_use]
    pub fn is_not_completed(&self) -> bool {
        matches!(self, Self::NotCompleted { .. })
    }

    /// Whether this outcome is a deadline expiry.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
