//! # Correlation Future
//!
//! A single-use handle bound to one correlation id. It resolves exactly once,
//! either with the matching response or with a [`ResponseError`], and can be
//! observed three ways:
//!
//! - polled with [`is_completed`](ResponseFuture::is_completed) and
//!   [`result`](ResponseFuture::result) from a frame loop,
//! - given continuations through [`on_complete`](ResponseFuture::on_complete),
//! - `.await`ed as a [`std::future::Future`].
//!
//! The resolving side is a crate-private [`Completer`] owned by the router's
//! correlation entry. Dropping an unused completer resolves the future as
//! [`ResponseError::Disconnected`], so no handle outlives its bus unresolved.

use crate::error::ResponseError;
use crate::worker::panic_message;
use parking_lot::Mutex;
use shared_types::{CorrelationId, Message};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::error;

/// What a resolved future holds.
pub type ResponseResult<R> = Result<Arc<R>, ResponseError>;

type Continuation<R> = Box<dyn FnOnce(&ResponseResult<R>) + Send>;

struct FutureState<R> {
    outcome: Option<ResponseResult<R>>,
    continuations: Vec<Continuation<R>>,
    waker: Option<Waker>,
}

/// Awaitable handle for the response to one request.
#[must_use = "a response future does nothing unless observed"]
pub struct ResponseFuture<R> {
    correlation_id: CorrelationId,
    shared: Arc<Mutex<FutureState<R>>>,
}

impl<R: Message> ResponseFuture<R> {
    /// An unresolved future and the completer that will resolve it.
    pub(crate) fn pending(correlation_id: CorrelationId) -> (Self, Completer<R>) {
        let shared = Arc::new(Mutex::new(FutureState {
            outcome: None,
            continuations: Vec::new(),
            waker: None,
        }));
        let completer = Completer {
            correlation_id,
            shared: Arc::clone(&shared),
        };
        (
            Self {
                correlation_id,
                shared,
            },
            completer,
        )
    }

    /// A future that is already resolved.
    pub(crate) fn resolved(correlation_id: CorrelationId, outcome: ResponseResult<R>) -> Self {
        let (future, completer) = Self::pending(correlation_id);
        completer.complete(outcome);
        future
    }

    /// The correlation id this future waits on.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Whether the future has resolved.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.shared.lock().outcome.is_some()
    }

    /// The resolved outcome.
    ///
    /// Returns the same response on every call once completed.
    ///
    /// # Errors
    ///
    /// `NotCompleted` before resolution, otherwise the error the future
    /// resolved with.
    pub fn result(&self) -> ResponseResult<R> {
        match &self.shared.lock().outcome {
            Some(outcome) => outcome.clone(),
            None => Err(ResponseError::NotCompleted {
                correlation_id: self.correlation_id,
            }),
        }
    }

    /// The resolved outcome, for callers that have already checked
    /// [`is_completed`](Self::is_completed).
    ///
    /// # Panics
    ///
    /// If the future has not resolved yet. Reading too early is a caller
    /// bug; use [`result`](Self::result) to handle it as a value instead.
    #[track_caller]
    #[allow(clippy::panic)]
    pub fn expect_result(&self) -> ResponseResult<R> {
        match self.result() {
            Err(ResponseError::NotCompleted { correlation_id }) => {
                panic!("response for correlation {correlation_id} read before completion")
            }
            outcome => outcome,
        }
    }

    /// Run `continuation` once the future resolves.
    ///
    /// Runs immediately on the calling thread if already resolved, otherwise
    /// on whichever thread resolves it (the one driving the router tick).
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce(&ResponseResult<R>) + Send + 'static,
    {
        let mut state = self.shared.lock();
        match &state.outcome {
            Some(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                continuation(&outcome);
            }
            None => state.continuations.push(Box::new(continuation)),
        }
    }
}

impl<R: Message> Future for ResponseFuture<R> {
    type Output = ResponseResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock();
        match &state.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<R> fmt::Debug for ResponseFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let completed = self.shared.lock().outcome.is_some();
        f.debug_struct("ResponseFuture")
            .field("correlation_id", &self.correlation_id)
            .field("completed", &completed)
            .finish()
    }
}

/// Resolving half of a [`ResponseFuture`].
pub(crate) struct Completer<R> {
    correlation_id: CorrelationId,
    shared: Arc<Mutex<FutureState<R>>>,
}

impl<R> Completer<R> {
    /// Resolve the future. Later calls are ignored and return `false`.
    pub(crate) fn complete(&self, outcome: ResponseResult<R>) -> bool {
        let (continuations, waker) = {
            let mut state = self.shared.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (std::mem::take(&mut state.continuations), state.waker.take())
        };

        for continuation in continuations {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| continuation(&outcome))) {
                error!(
                    correlation_id = %self.correlation_id,
                    reason = %panic_message(payload.as_ref()),
                    "Future continuation panicked"
                );
            }
        }

        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

impl<R> Drop for Completer<R> {
    fn drop(&mut self) {
        self.complete(Err(ResponseError::Disconnected));
    }
}
