//! # Dispatch Worker
//!
//! Owns the inbound request queue, the outbound delivery queue and the
//! dedicated thread that moves work between them.
//!
//! ```text
//!   caller ──submit()──▶ [inbound] ──▶ worker thread ──▶ [outbound] ──drain_response()──▶ router
//!                                          │
//!                                   registry.resolve()
//!                                   handler.invoke()
//! ```
//!
//! The worker blocks on the inbound channel while it is empty and wakes as
//! soon as a request is submitted. Requests are handled one at a time, so
//! deliveries leave the outbound queue in the order their requests arrived.
//!
//! A request that cannot be answered (no handler, handler error, handler
//! panic) produces no response. The worker enqueues a [`Delivery::Failed`]
//! notice in its place so correlation waiters for that id can be released.

use crate::error::{ConfigurationError, ResponseError};
use crate::metrics::MetricsRecorder;
use crate::registry::HandlerRegistry;
use parking_lot::Mutex;
use shared_types::{CorrelationId, Envelope, Message, TypeTag};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

/// What the worker puts on the outbound queue for each request it dequeues.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// The handler's response.
    Response(Envelope),
    /// The request was dropped without a response.
    Failed {
        /// Type of the dropped request.
        request: TypeTag,
        /// Correlation id of the dropped request.
        correlation_id: CorrelationId,
        /// Why it was dropped.
        error: ResponseError,
    },
}

impl Delivery {
    /// Correlation id this delivery settles.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Response(envelope) => envelope.correlation_id(),
            Self::Failed { correlation_id, .. } => *correlation_id,
        }
    }

    /// The response, if this delivery carries one.
    #[must_use]
    pub fn response(&self) -> Option<&Envelope> {
        match self {
            Self::Response(envelope) => Some(envelope),
            Self::Failed { .. } => None,
        }
    }
}

enum Command {
    Dispatch(Envelope),
    Shutdown,
}

/// Clonable submit handle for the inbound queue.
///
/// Hand one to anything that needs to issue requests from outside the
/// owner of the bus, including code running inside response callbacks.
#[derive(Clone)]
pub struct Requester {
    inbound: mpsc::UnboundedSender<Command>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl Requester {
    /// Enqueue a request, fire-and-forget.
    pub fn submit<M: Message>(&self, request: M) {
        self.submit_envelope(Envelope::new(request));
    }

    /// Enqueue an already erased request, fire-and-forget.
    pub fn submit_envelope(&self, request: Envelope) {
        // Failure is already logged by try_submit_envelope.
        let _ = self.try_submit_envelope(request);
    }

    /// Enqueue a request, reporting whether the worker accepted it.
    ///
    /// # Errors
    ///
    /// `Disconnected` once the worker has shut down.
    pub fn try_submit_envelope(&self, request: Envelope) -> Result<(), ResponseError> {
        let tag = request.tag();
        let correlation_id = request.correlation_id();

        match self.inbound.send(Command::Dispatch(request)) {
            Ok(()) => {
                self.metrics.record_submitted();
                debug!(request = %tag, correlation_id = %correlation_id, "Request submitted");
                Ok(())
            }
            Err(_) => {
                warn!(
                    request = %tag,
                    correlation_id = %correlation_id,
                    "Request dropped, dispatch worker is not running"
                );
                Err(ResponseError::Disconnected)
            }
        }
    }

    /// Whether the worker still accepts requests.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inbound.is_closed()
    }
}

/// The background half of the dispatch core.
pub struct DispatchWorker {
    requester: Requester,
    outbound: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    registry: Arc<HandlerRegistry>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchWorker {
    /// Start the worker thread over a frozen registry.
    ///
    /// # Errors
    ///
    /// `WorkerSpawn` if the OS refuses to create the thread.
    pub fn spawn(
        registry: HandlerRegistry,
        thread_name: &str,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self, ConfigurationError> {
        let registry = Arc::new(registry);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let thread = {
            let registry = Arc::clone(&registry);
            let metrics = Arc::clone(&metrics);
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || run(&registry, inbound_rx, &outbound_tx, metrics.as_ref()))
                .map_err(|e| ConfigurationError::WorkerSpawn(e.to_string()))?
        };

        info!(
            thread = thread_name,
            handlers = registry.len(),
            "Dispatch worker started"
        );

        Ok(Self {
            requester: Requester {
                inbound: inbound_tx,
                metrics,
            },
            outbound: Mutex::new(outbound_rx),
            registry,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Enqueue a request, fire-and-forget.
    pub fn submit(&self, request: Envelope) {
        self.requester.submit_envelope(request);
    }

    /// Enqueue a request, reporting whether the worker accepted it.
    ///
    /// # Errors
    ///
    /// `Disconnected` once the worker has shut down.
    pub fn try_submit(&self, request: Envelope) -> Result<(), ResponseError> {
        self.requester.try_submit_envelope(request)
    }

    /// Whether the worker still accepts requests.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.requester.is_connected()
    }

    /// A clonable submit handle.
    #[must_use]
    pub fn requester(&self) -> Requester {
        self.requester.clone()
    }

    /// Remove the oldest queued delivery, or `None` when the queue is empty.
    pub fn drain_response(&self) -> Option<Delivery> {
        match self.outbound.lock().try_recv() {
            Ok(delivery) => Some(delivery),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// The registry the worker dispatches against.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Whether the worker thread is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the worker after it finishes every request queued so far.
    ///
    /// Deliveries already produced stay drainable. Idempotent.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };

        // The worker may already be gone if every sender was dropped.
        let _ = self.requester.inbound.send(Command::Shutdown);

        if thread.join().is_err() {
            error!("Dispatch worker thread panicked");
        }
        info!("Dispatch worker shut down");
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    registry: &HandlerRegistry,
    mut inbound: mpsc::UnboundedReceiver<Command>,
    outbound: &mpsc::UnboundedSender<Delivery>,
    metrics: &dyn MetricsRecorder,
) {
    while let Some(command) = inbound.blocking_recv() {
        let request = match command {
            Command::Dispatch(request) => request,
            Command::Shutdown => break,
        };

        let delivery = process(registry, &request, metrics);
        if outbound.send(delivery).is_err() {
            debug!("Outbound queue closed, dispatch worker exiting");
            break;
        }
    }

    debug!("Dispatch worker loop finished");
}

fn process(registry: &HandlerRegistry, request: &Envelope, metrics: &dyn MetricsRecorder) -> Delivery {
    let tag = request.tag();
    let correlation_id = request.correlation_id();

    let Some(binding) = registry.resolve(tag) else {
        warn!(
            request = %tag,
            correlation_id = %correlation_id,
            "No handler registered, request dropped"
        );
        metrics.record_unroutable();
        return Delivery::Failed {
            request: tag,
            correlation_id,
            error: ResponseError::Unroutable { request: tag },
        };
    };

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| binding.invoke(request)));

    let reason = match outcome {
        Ok(Ok(response)) => {
            metrics.record_handled(started.elapsed());
            if response.correlation_id() != correlation_id {
                warn!(
                    request = %tag,
                    correlation_id = %correlation_id,
                    response_correlation_id = %response.correlation_id(),
                    "Handler changed the correlation id"
                );
            }
            debug!(
                request = %tag,
                response = %response.tag(),
                correlation_id = %correlation_id,
                "Request handled"
            );
            return Delivery::Response(response);
        }
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    error!(
        request = %tag,
        handler = binding.handler_name(),
        correlation_id = %correlation_id,
        reason = %reason,
        "Handler failed, no response produced"
    );
    metrics.record_handler_fault();

    Delivery::Failed {
        request: tag,
        correlation_id,
        error: ResponseError::HandlerFailed {
            request: tag,
            reason,
        },
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BusMetrics, NoOpMetrics};
    use shared_types::HandlerError;
    use std::time::Duration;

    #[derive(Debug)]
    struct Ping {
        id: CorrelationId,
    }

    impl Message for Ping {
        fn correlation_id(&self) -> CorrelationId {
            self.id
        }
    }

    #[derive(Debug)]
    struct Pong {
        id: CorrelationId,
    }

    impl Message for Pong {
        fn correlation_id(&self) -> CorrelationId {
            self.id
        }
    }

    #[derive(Debug)]
    struct Explode {
        id: CorrelationId,
    }

    impl Message for Explode {
        fn correlation_id(&self) -> CorrelationId {
            self.id
        }
    }

    #[derive(Debug)]
    struct Orphan;

    impl Message for Orphan {
        fn correlation_id(&self) -> CorrelationId {
            CorrelationId::new(99)
        }
    }

    fn ping(id: u64) -> Ping {
        Ping {
            id: CorrelationId::new(id),
        }
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::builder()
            .register_fn(|ping: &Ping| Ok(Pong { id: ping.id }))
            .unwrap()
            .register_fn(|explode: &Explode| -> Result<Pong, HandlerError> {
                if explode.id.get() == 0 {
                    Err(HandlerError::invalid("zero id"))
                } else {
                    panic!("kaboom {}", explode.id)
                }
            })
            .unwrap()
            .build()
            .unwrap()
    }

    fn spawn(metrics: Arc<dyn MetricsRecorder>) -> DispatchWorker {
        DispatchWorker::spawn(registry(), "test-worker", metrics).unwrap()
    }

    /// Poll the outbound queue until `count` deliveries arrive.
    fn drain(worker: &DispatchWorker, count: usize) -> Vec<Delivery> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < count {
            if let Some(delivery) = worker.drain_response() {
                out.push(delivery);
            } else {
                assert!(Instant::now() < deadline, "timed out waiting for deliveries");
                thread::sleep(Duration::from_millis(1));
            }
        }
        out
    }

    #[test]
    fn test_drain_empty_is_none() {
        let worker = spawn(Arc::new(NoOpMetrics));
        assert!(worker.drain_response().is_none());
        assert!(worker.is_running());
    }

    #[test]
    fn test_responses_follow_submission_order() {
        let worker = spawn(Arc::new(NoOpMetrics));
        for id in 1..=50 {
            worker.submit(Envelope::new(ping(id)));
        }

        let ids: Vec<u64> = drain(&worker, 50)
            .iter()
            .map(|d| {
                assert!(d.response().unwrap().is::<Pong>());
                d.correlation_id().get()
            })
            .collect();
        assert_eq!(ids, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_unroutable_request_yields_failure_notice() {
        let metrics = Arc::new(BusMetrics::new());
        let worker = spawn(metrics.clone());

        worker.submit(Envelope::new(Orphan));
        worker.submit(Envelope::new(ping(2)));

        let deliveries = drain(&worker, 2);
        match &deliveries[0] {
            Delivery::Failed {
                correlation_id,
                error,
                ..
            } => {
                assert_eq!(correlation_id.get(), 99);
                assert!(matches!(error, ResponseError::Unroutable { .. }));
            }
            other => panic!("expected failure notice, got {other:?}"),
        }
        assert!(deliveries[1].response().is_some());
        assert_eq!(metrics.snapshot().unroutable, 1);
    }

    #[test]
    fn test_handler_error_and_panic_do_not_stop_worker() {
        let metrics = Arc::new(BusMetrics::new());
        let worker = spawn(metrics.clone());

        worker.submit(Envelope::new(Explode {
            id: CorrelationId::new(0),
        }));
        worker.submit(Envelope::new(Explode {
            id: CorrelationId::new(7),
        }));
        worker.submit(Envelope::new(ping(8)));

        let deliveries = drain(&worker, 3);
        match &deliveries[0] {
            Delivery::Failed { error, .. } => {
                assert_eq!(
                    error.to_string(),
                    "handler for Explode failed: invalid request: zero id"
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
        match &deliveries[1] {
            Delivery::Failed {
                error: ResponseError::HandlerFailed { reason, .. },
                ..
            } => assert!(reason.contains("kaboom 7")),
            other => panic!("expected panic failure, got {other:?}"),
        }
        assert_eq!(deliveries[2].correlation_id().get(), 8);
        assert!(worker.is_running());
        assert_eq!(metrics.snapshot().handler_faults, 2);
    }

    #[test]
    fn test_shutdown_processes_queued_requests_first() {
        let worker = spawn(Arc::new(NoOpMetrics));
        let requester = worker.requester();
        for id in 1..=5 {
            requester.submit(ping(id));
        }

        worker.shutdown();
        assert!(!worker.is_running());
        assert!(!requester.is_connected());

        let mut drained = 0;
        while worker.drain_response().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 5);

        assert_eq!(
            requester.try_submit_envelope(Envelope::new(ping(6))),
            Err(ResponseError::Disconnected)
        );
        worker.shutdown();
    }

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
