//! # Response Router
//!
//! Consumer-side half of the dispatch core. Once per tick it drains the
//! worker's outbound queue and fans each delivery out along two paths:
//!
//! ```text
//!   Delivery::Response(env)
//!     ├── broadcast:  env.tag()            → every subscriber, registration order
//!     └── correlated: env.correlation_id() → every waiter, then entry removed
//!
//!   Delivery::Failed { error, .. }
//!     └── correlated: waiters resolved with `error`, then entry removed
//! ```
//!
//! Callbacks always run with the router's lock released, so a callback may
//! subscribe, unsubscribe, register new waiters or submit new requests.
//! Each callback is isolated: a panic is logged and routing continues.

use crate::error::ResponseError;
use crate::future::ResponseFuture;
use crate::listeners::{Callback, ErasedListeners, ListenerSet};
use crate::metrics::MetricsRecorder;
use crate::worker::{panic_message, Delivery, DispatchWorker};
use parking_lot::Mutex;
use shared_types::{CorrelationId, Envelope, Message, TypeTag};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

type Waiter = Box<dyn FnOnce(Result<&Envelope, &ResponseError>) + Send>;

struct PendingEntry {
    waiters: Vec<Waiter>,
    registered_at: Instant,
    deadline: Option<Instant>,
}

#[derive(Default)]
struct RouterState {
    broadcast: HashMap<TypeTag, Box<dyn ErasedListeners>>,
    pending: HashMap<CorrelationId, PendingEntry>,
}

/// Counts from routing one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Routed {
    /// Broadcast callbacks invoked.
    pub broadcast: usize,
    /// Correlation waiters invoked.
    pub correlated: usize,
    /// Callbacks that panicked.
    pub faults: usize,
}

impl Routed {
    /// Whether nobody observed the delivery.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.broadcast == 0 && self.correlated == 0
    }
}

/// Summary of one drain-and-dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Responses drained.
    pub responses: usize,
    /// Failure notices drained.
    pub failures: usize,
    /// Broadcast callbacks invoked.
    pub broadcast: usize,
    /// Correlation waiters invoked.
    pub correlated: usize,
    /// Responses nobody observed.
    pub discarded: usize,
    /// Correlation entries expired.
    pub expired: usize,
    /// Callbacks that panicked.
    pub callback_faults: usize,
}

impl TickReport {
    /// Whether the tick did anything.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    fn absorb(&mut self, delivery_was_response: bool, routed: Routed) {
        if delivery_was_response {
            self.responses += 1;
            if routed.is_discarded() {
                self.discarded += 1;
            }
        } else {
            self.failures += 1;
        }
        self.broadcast += routed.broadcast;
        self.correlated += routed.correlated;
        self.callback_faults += routed.faults;
    }
}

/// Broadcast subscriptions plus pending correlation entries.
pub struct ResponseRouter {
    state: Mutex<RouterState>,
    default_timeout: Option<Duration>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ResponseRouter {
    /// Create a router. `default_timeout` applies to waiters registered
    /// without an explicit deadline.
    pub fn new(default_timeout: Option<Duration>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            default_timeout,
            metrics,
        }
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Subscribe `callback` to every response of type `R`.
    pub fn add_listener<R: Message>(&self, callback: Callback<R>) {
        let tag = TypeTag::of::<R>();
        let mut state = self.state.lock();
        let entry = state
            .broadcast
            .entry(tag)
            .or_insert_with(|| Box::new(ListenerSet::<R>::default()));

        if let Some(set) = entry.as_any_mut().downcast_mut::<ListenerSet<R>>() {
            set.add(callback);
            debug!(response = %tag, subscribers = set.len(), "Listener added");
        }
    }

    /// Remove one registration of `callback`. Returns `false` if it was not
    /// subscribed.
    pub fn remove_listener<R: Message>(&self, callback: &Callback<R>) -> bool {
        let tag = TypeTag::of::<R>();
        let mut state = self.state.lock();
        let Some(entry) = state.broadcast.get_mut(&tag) else {
            return false;
        };

        let removed = entry
            .as_any_mut()
            .downcast_mut::<ListenerSet<R>>()
            .is_some_and(|set| set.remove(callback));

        if entry.len() == 0 {
            state.broadcast.remove(&tag);
        }
        if removed {
            debug!(response = %tag, "Listener removed");
        }
        removed
    }

    /// Number of registrations for `R`.
    #[must_use]
    pub fn listener_count<R: Message>(&self) -> usize {
        self.state
            .lock()
            .broadcast
            .get(&TypeTag::of::<R>())
            .map_or(0, |set| set.len())
    }

    // =========================================================================
    // Correlation
    // =========================================================================

    /// A future resolved by the response for `correlation_id`, using the
    /// default deadline.
    pub fn await_response<R: Message>(&self, correlation_id: CorrelationId) -> ResponseFuture<R> {
        self.await_response_with_deadline(correlation_id, self.default_timeout)
    }

    /// A future resolved by the response for `correlation_id`, or with
    /// `TimedOut` once `timeout` elapses.
    pub fn await_response_within<R: Message>(
        &self,
        correlation_id: CorrelationId,
        timeout: Duration,
    ) -> ResponseFuture<R> {
        self.await_response_with_deadline(correlation_id, Some(timeout))
    }

    fn await_response_with_deadline<R: Message>(
        &self,
        correlation_id: CorrelationId,
        timeout: Option<Duration>,
    ) -> ResponseFuture<R> {
        let (future, completer) = ResponseFuture::pending(correlation_id);

        self.register_waiter(
            correlation_id,
            timeout,
            Box::new(move |outcome: Result<&Envelope, &ResponseError>| {
                let result = match outcome {
                    Ok(response) => response.downcast::<R>().ok_or_else(|| {
                        let mismatch = ResponseError::TypeMismatch {
                            expected: TypeTag::of::<R>(),
                            actual: response.tag(),
                        };
                        warn!(
                            correlation_id = %correlation_id,
                            error = %mismatch,
                            "Correlated response has unexpected type"
                        );
                        mismatch
                    }),
                    Err(err) => Err(err.clone()),
                };
                completer.complete(result);
            }),
        );

        future
    }

    /// Run `callback` once with the response for `correlation_id`.
    ///
    /// If no response of type `R` arrives (failure notice, deadline, wrong
    /// type) the callback is dropped uninvoked and a warning is logged.
    pub fn register_callback<R, F>(&self, correlation_id: CorrelationId, callback: F)
    where
        R: Message,
        F: FnOnce(&R) + Send + 'static,
    {
        self.register_waiter(
            correlation_id,
            self.default_timeout,
            Box::new(move |outcome: Result<&Envelope, &ResponseError>| match outcome {
                Ok(response) => match response.downcast_ref::<R>() {
                    Some(typed) => callback(typed),
                    None => warn!(
                        correlation_id = %correlation_id,
                        expected = %TypeTag::of::<R>(),
                        actual = %response.tag(),
                        "Correlated response has unexpected type, callback dropped"
                    ),
                },
                Err(err) => warn!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "No response for correlated callback, callback dropped"
                ),
            }),
        );
    }

    fn register_waiter(&self, correlation_id: CorrelationId, timeout: Option<Duration>, waiter: Waiter) {
        let now = Instant::now();
        // A timeout too large to represent means no deadline.
        let deadline = timeout.and_then(|timeout| now.checked_add(timeout));

        let mut state = self.state.lock();
        let entry = state
            .pending
            .entry(correlation_id)
            .or_insert_with(|| PendingEntry {
                waiters: Vec::new(),
                registered_at: now,
                deadline: None,
            });

        // With several waiters on one id the earliest deadline wins.
        if let Some(deadline) = deadline {
            entry.deadline = Some(entry.deadline.map_or(deadline, |d| d.min(deadline)));
        }
        entry.waiters.push(waiter);

        debug!(
            correlation_id = %correlation_id,
            waiters = entry.waiters.len(),
            "Correlation waiter registered"
        );
    }

    /// Number of correlation ids with at least one waiter.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether anyone waits on `correlation_id`.
    #[must_use]
    pub fn is_pending(&self, correlation_id: CorrelationId) -> bool {
        self.state.lock().pending.contains_key(&correlation_id)
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Route one delivery along the broadcast and correlation paths.
    pub fn route(&self, delivery: &Delivery) -> Routed {
        let correlation_id = delivery.correlation_id();

        let (listeners, entry) = {
            let mut state = self.state.lock();
            let listeners = delivery
                .response()
                .and_then(|response| state.broadcast.get(&response.tag()))
                .map(|set| set.snapshot());
            (listeners, state.pending.remove(&correlation_id))
        };

        let mut routed = Routed::default();

        if let (Some(listeners), Some(response)) = (&listeners, delivery.response()) {
            let fanout = listeners.notify_envelope(response);
            routed.broadcast = fanout.invoked;
            routed.faults += fanout.faulted;
        }

        let outcome = match delivery {
            Delivery::Response(response) => Ok(response),
            Delivery::Failed { error, .. } => Err(error),
        };
        if let Some(entry) = entry {
            routed.correlated = entry.waiters.len();
            routed.faults += self.resolve(correlation_id, entry.waiters, outcome);
        }

        match delivery {
            Delivery::Response(response) if routed.is_discarded() => debug!(
                response = %response.tag(),
                correlation_id = %correlation_id,
                "Response discarded, nobody listening"
            ),
            Delivery::Response(response) => debug!(
                response = %response.tag(),
                correlation_id = %correlation_id,
                broadcast = routed.broadcast,
                correlated = routed.correlated,
                "Response routed"
            ),
            Delivery::Failed { request, error, .. } => debug!(
                request = %request,
                correlation_id = %correlation_id,
                error = %error,
                waiters = routed.correlated,
                "Failure notice routed"
            ),
        }

        self.metrics.record_routed(routed.broadcast, routed.correlated);
        for _ in 0..routed.faults {
            self.metrics.record_callback_fault();
        }
        routed
    }

    /// Drain the worker's outbound queue and route every delivery, then
    /// expire overdue correlation entries.
    ///
    /// `budget` caps the deliveries routed in this pass; the rest stay
    /// queued for the next tick.
    pub fn drain_and_dispatch(&self, worker: &DispatchWorker, budget: Option<usize>) -> TickReport {
        let mut report = TickReport::default();
        let limit = budget.unwrap_or(usize::MAX);
        let mut drained = 0;

        while drained < limit {
            let Some(delivery) = worker.drain_response() else {
                break;
            };
            drained += 1;
            let routed = self.route(&delivery);
            report.absorb(matches!(delivery, Delivery::Response(_)), routed);
        }

        report.expired = self.expire(Instant::now());
        report
    }

    /// Resolve every entry whose deadline is at or before `now` with
    /// `TimedOut`. Returns the number of entries expired.
    pub fn expire(&self, now: Instant) -> usize {
        let overdue: Vec<(CorrelationId, PendingEntry)> = {
            let mut state = self.state.lock();
            let ids: Vec<CorrelationId> = state
                .pending
                .iter()
                .filter(|(_, entry)| entry.deadline.is_some_and(|deadline| deadline <= now))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.pending.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let expired = overdue.len();
        for (correlation_id, entry) in overdue {
            let waited = now.saturating_duration_since(entry.registered_at);
            warn!(
                correlation_id = %correlation_id,
                waited_ms = waited.as_millis() as u64,
                waiters = entry.waiters.len(),
                "Correlation expired before a response arrived"
            );
            self.metrics.record_timeout();

            let error = ResponseError::TimedOut {
                correlation_id,
                waited,
            };
            let faults = self.resolve(correlation_id, entry.waiters, Err(&error));
            for _ in 0..faults {
                self.metrics.record_callback_fault();
            }
        }
        expired
    }

    /// Resolve every pending entry with `error`. Returns the number of
    /// entries resolved.
    pub fn fail_all(&self, error: &ResponseError) -> usize {
        let entries: Vec<(CorrelationId, PendingEntry)> =
            self.state.lock().pending.drain().collect();

        let count = entries.len();
        for (correlation_id, entry) in entries {
            self.resolve(correlation_id, entry.waiters, Err(error));
        }
        if count > 0 {
            warn!(count, error = %error, "Pending correlations failed");
        }
        count
    }

    /// Invoke each waiter in order, isolating panics. Returns the number of
    /// waiters that panicked.
    fn resolve(
        &self,
        correlation_id: CorrelationId,
        waiters: Vec<Waiter>,
        outcome: Result<&Envelope, &ResponseError>,
    ) -> usize {
        let mut faults = 0;
        for waiter in waiters {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || waiter(outcome))) {
                faults += 1;
                error!(
                    correlation_id = %correlation_id,
                    reason = %panic_message(payload.as_ref()),
                    "Correlation callback panicked"
                );
            }
        }
        faults
    }
}
