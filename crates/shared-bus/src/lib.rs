//! # Shared Bus - In-Process Request/Response Dispatch
//!
//! A caller submits typed requests; a single background worker resolves each
//! request's handler by concrete type and produces exactly one typed
//! response; the caller's own thread drains responses once per frame and
//! fans them out to broadcast subscribers and to correlation waiters.
//!
//! ```text
//!  caller thread                          worker thread
//! ┌───────────────────────┐            ┌────────────────────────┐
//! │ submit / submit_*     │──inbound──▶│ registry.resolve(tag)  │
//! │                       │            │ handler.handle(req)    │
//! │ tick()                │◀─outbound──│                        │
//! │  ├─ broadcast by type │            └────────────────────────┘
//! │  └─ waiters by id     │
//! └───────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Handlers are bound once, before the worker starts; one per request type.
//! - Responses leave the worker in the order their requests arrived.
//! - A correlation entry is removed as soon as its response (or failure
//!   notice, or deadline) resolves it.
//! - Handler, callback and continuation panics are contained and logged.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod error;
pub mod future;
pub mod listeners;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod worker;

// Re-export main types
pub use bus::{MessageBus, MessageBusBuilder};
pub use config::{BusConfig, DEFAULT_WORKER_THREAD_NAME};
pub use error::{ConfigurationError, ResponseError};
pub use future::{ResponseFuture, ResponseResult};
pub use listeners::{Callback, ListenerSet};
pub use metrics::{BusMetrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use registry::{HandlerBinding, HandlerRegistry, HandlerRegistryBuilder, MessageHandler};
pub use router::{ResponseRouter, Routed, TickReport};
pub use worker::{Delivery, DispatchWorker, Requester};

pub use shared_types::{
    CorrelationId, CorrelationIdAllocator, Envelope, GameSystem, HandlerError, Message, TypeTag,
};
