//! # Message Bus
//!
//! The boundary the rest of the application talks to. A `MessageBus` owns one
//! dispatch worker and one response router and exposes the request/response
//! surface over them:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`submit`](MessageBus::submit) | fire-and-forget enqueue |
//! | [`submit_with_callback`](MessageBus::submit_with_callback) | enqueue + one-shot callback on the correlation id |
//! | [`submit_awaiting`](MessageBus::submit_awaiting) | enqueue + [`ResponseFuture`] on the correlation id |
//! | [`subscribe`](MessageBus::subscribe) / [`unsubscribe`](MessageBus::unsubscribe) | persistent broadcast registration |
//! | [`tick`](MessageBus::tick) | drain and route; call once per frame |
//!
//! Instances are independent: nothing is global, so tests can run several
//! buses side by side.

use crate::config::BusConfig;
use crate::error::{ConfigurationError, ResponseError};
use crate::future::ResponseFuture;
use crate::listeners::Callback;
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::registry::{HandlerRegistry, HandlerRegistryBuilder, MessageHandler};
use crate::router::{ResponseRouter, TickReport};
use crate::worker::{Delivery, DispatchWorker, Requester};
use shared_types::{CorrelationId, CorrelationIdAllocator, Envelope, GameSystem, HandlerError, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Wires handlers, configuration and metrics, then starts the worker.
pub struct MessageBusBuilder {
    handlers: HandlerRegistryBuilder,
    config: BusConfig,
    metrics: Arc<dyn MetricsRecorder>,
}

impl Default for MessageBusBuilder {
    fn default() -> Self {
        Self {
            handlers: HandlerRegistry::builder(),
            config: BusConfig::default(),
            metrics: Arc::new(NoOpMetrics),
        }
    }
}

impl MessageBusBuilder {
    /// Bind a handler.
    ///
    /// # Errors
    ///
    /// `DuplicateHandler` if its request type is already bound.
    pub fn handler<H: MessageHandler>(mut self, handler: H) -> Result<Self, ConfigurationError> {
        self.handlers = self.handlers.register(handler)?;
        Ok(self)
    }

    /// Bind a closure as a handler.
    ///
    /// # Errors
    ///
    /// `DuplicateHandler` if `Req` is already bound.
    pub fn handler_fn<Req, Resp, F>(mut self, handler: F) -> Result<Self, ConfigurationError>
    where
        Req: Message,
        Resp: Message,
        F: Fn(&Req) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        self.handlers = self.handlers.register_fn(handler)?;
        Ok(self)
    }

    /// Declare that `Req` must be bound before the bus starts.
    #[must_use]
    pub fn require<Req: Message>(mut self) -> Self {
        self.handlers = self.handlers.require::<Req>();
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Report to `metrics` instead of discarding measurements.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Freeze the registry and start the worker.
    ///
    /// # Errors
    ///
    /// Any [`ConfigurationError`]; the worker is not started.
    pub fn start(self) -> Result<MessageBus, ConfigurationError> {
        let registry = self.handlers.build()?;
        MessageBus::start(registry, self.config, self.metrics)
    }
}

/// In-process request/response bus.
pub struct MessageBus {
    worker: DispatchWorker,
    router: ResponseRouter,
    ids: CorrelationIdAllocator,
    config: BusConfig,
}

impl MessageBus {
    /// Start configuring a bus.
    #[must_use]
    pub fn builder() -> MessageBusBuilder {
        MessageBusBuilder::default()
    }

    /// Start a bus over an already built registry.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` or `WorkerSpawn`.
    pub fn start(
        registry: HandlerRegistry,
        config: BusConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let router = ResponseRouter::new(config.request_timeout(), Arc::clone(&metrics));
        let worker = DispatchWorker::spawn(registry, &config.worker_thread_name, metrics)?;

        info!(
            handlers = worker.registry().len(),
            request_timeout_ms = ?config.request_timeout_ms,
            max_deliveries_per_tick = ?config.max_deliveries_per_tick,
            "Message bus started"
        );

        Ok(Self {
            worker,
            router,
            ids: CorrelationIdAllocator::new(),
            config,
        })
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Hand out a fresh correlation id.
    pub fn next_correlation_id(&self) -> CorrelationId {
        self.ids.next_id()
    }

    /// Enqueue `request`, fire-and-forget.
    pub fn submit<M: Message>(&self, request: M) {
        self.worker.submit(Envelope::new(request));
    }

    /// Enqueue `request` and run `callback` once with its response.
    ///
    /// The callback is registered before the request is enqueued, so it
    /// cannot miss a fast response.
    pub fn submit_with_callback<Req, Resp, F>(&self, request: Req, callback: F)
    where
        Req: Message,
        Resp: Message,
        F: FnOnce(&Resp) + Send + 'static,
    {
        let envelope = Envelope::new(request);
        self.router
            .register_callback(envelope.correlation_id(), callback);
        self.enqueue_correlated(envelope);
    }

    /// Enqueue `request` and return a future for its response, subject to
    /// the configured default deadline.
    pub fn submit_awaiting<Req, Resp>(&self, request: Req) -> ResponseFuture<Resp>
    where
        Req: Message,
        Resp: Message,
    {
        let envelope = Envelope::new(request);
        let future = self.router.await_response(envelope.correlation_id());
        self.enqueue_correlated(envelope);
        future
    }

    /// Enqueue `request` and return a future that resolves with `TimedOut`
    /// if no response is routed within `timeout`.
    pub fn submit_awaiting_within<Req, Resp>(&self, request: Req, timeout: Duration) -> ResponseFuture<Resp>
    where
        Req: Message,
        Resp: Message,
    {
        let envelope = Envelope::new(request);
        let future = self
            .router
            .await_response_within(envelope.correlation_id(), timeout);
        self.enqueue_correlated(envelope);
        future
    }

    /// A future for the response carrying `correlation_id`, for requests
    /// submitted through another path.
    pub fn await_response<R: Message>(&self, correlation_id: CorrelationId) -> ResponseFuture<R> {
        if !self.worker.is_accepting() {
            return ResponseFuture::resolved(correlation_id, Err(ResponseError::Disconnected));
        }
        self.router.await_response(correlation_id)
    }

    /// A clonable handle for submitting from callbacks or other threads.
    #[must_use]
    pub fn requester(&self) -> Requester {
        self.worker.requester()
    }

    fn enqueue_correlated(&self, envelope: Envelope) {
        let request = envelope.tag();
        let correlation_id = envelope.correlation_id();

        if let Err(error) = self.worker.try_submit(envelope) {
            self.router.route(&Delivery::Failed {
                request,
                correlation_id,
                error,
            });
        }
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Subscribe `callback` to every response of type `R`.
    pub fn subscribe<R: Message>(&self, callback: Callback<R>) {
        self.router.add_listener(callback);
    }

    /// Subscribe a closure and return the handle needed to unsubscribe it.
    pub fn subscribe_fn<R, F>(&self, f: F) -> Callback<R>
    where
        R: Message,
        F: Fn(&R) + Send + Sync + 'static,
    {
        let callback = Callback::new(f);
        self.router.add_listener(callback.clone());
        callback
    }

    /// Remove one registration of `callback`. Returns `false` if it was not
    /// subscribed.
    pub fn unsubscribe<R: Message>(&self, callback: &Callback<R>) -> bool {
        self.router.remove_listener(callback)
    }

    /// Number of broadcast registrations for `R`.
    #[must_use]
    pub fn subscriber_count<R: Message>(&self) -> usize {
        self.router.listener_count::<R>()
    }

    // =========================================================================
    // Per-frame
    // =========================================================================

    /// Drain the outbound queue and route every delivery, within the
    /// configured per-tick budget, then expire overdue correlations.
    pub fn tick(&self) -> TickReport {
        self.router
            .drain_and_dispatch(&self.worker, self.config.max_deliveries_per_tick)
    }

    /// Number of correlation ids still waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.router.pending_count()
    }

    /// Whether the worker thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// The handler table.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        self.worker.registry()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Stop the worker, route everything it already produced, and resolve
    /// whatever is still pending as `Disconnected`. Idempotent.
    pub fn shutdown(&self) -> TickReport {
        self.worker.shutdown();
        let report = self.router.drain_and_dispatch(&self.worker, None);
        let abandoned = self.router.fail_all(&ResponseError::Disconnected);

        info!(
            routed = report.responses + report.failures,
            abandoned,
            "Message bus shut down"
        );
        report
    }
}

impl GameSystem for MessageBus {
    fn name(&self) -> &'static str {
        "message-bus"
    }

    fn on_update(&mut self) {
        let report = self.tick();
        if !report.is_idle() {
            debug!(
                responses = report.responses,
                failures = report.failures,
                expired = report.expired,
                "Bus tick"
            );
        }
    }

    fn on_destroy(&mut self) {
        self.shutdown();
    }
}
