//! Broadcast listener sets.
//!
//! Subscribers for one response type are kept in registration order. The same
//! [`Callback`] may be added more than once and is then invoked once per
//! registration; removal takes out exactly one occurrence, the most recent.

use crate::worker::panic_message;
use shared_types::{Envelope, Message, TypeTag};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// A shareable broadcast callback for responses of type `R`.
///
/// Two `Callback`s are equal when they are clones of the same handle, which
/// is how [`unsubscribe`](crate::MessageBus::unsubscribe) finds the one to
/// remove.
pub struct Callback<R> {
    inner: Arc<dyn Fn(&R) + Send + Sync>,
}

impl<R> Callback<R> {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Invoke the callback.
    pub fn call(&self, response: &R) {
        (self.inner)(response);
    }
}

impl<R> Clone for Callback<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> PartialEq for Callback<R> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.inner).cast::<()>() == Arc::as_ptr(&other.inner).cast::<()>()
    }
}

impl<R> Eq for Callback<R> {}

impl<R> fmt::Debug for Callback<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// Ordered subscribers for one response type.
pub struct ListenerSet<R> {
    callbacks: Vec<Callback<R>>,
}

impl<R> Default for ListenerSet<R> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<R> Clone for ListenerSet<R> {
    fn clone(&self) -> Self {
        Self {
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<R> ListenerSet<R> {
    /// Append a registration.
    pub fn add(&mut self, callback: Callback<R>) {
        self.callbacks.push(callback);
    }

    /// Remove the most recent registration of `callback`.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&mut self, callback: &Callback<R>) -> bool {
        match self.callbacks.iter().rposition(|c| c == callback) {
            Some(index) => {
                self.callbacks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Invoke every registration in order, isolating panics.
    ///
    /// Returns the number of callbacks that panicked.
    pub fn notify(&self, response: &R) -> usize
    where
        R: Message,
    {
        let mut faults = 0;
        for callback in &self.callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback.call(response))) {
                faults += 1;
                error!(
                    response = %TypeTag::of::<R>(),
                    correlation_id = %response.correlation_id(),
                    reason = %panic_message(payload.as_ref()),
                    "Broadcast callback panicked"
                );
            }
        }
        faults
    }
}

/// Counts from one broadcast fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Callbacks invoked.
    pub invoked: usize,
    /// Callbacks that panicked.
    pub faulted: usize,
}

/// A [`ListenerSet`] with its response type erased, stored in the router's
/// type-keyed map.
pub(crate) trait ErasedListeners: Send + Sync {
    fn len(&self) -> usize;
    fn snapshot(&self) -> Box<dyn ErasedListeners>;
    fn notify_envelope(&self, response: &Envelope) -> Fanout;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R: Message> ErasedListeners for ListenerSet<R> {
    fn len(&self) -> usize {
        self.callbacks.len()
    }

    fn snapshot(&self) -> Box<dyn ErasedListeners> {
        Box::new(self.clone())
    }

    fn notify_envelope(&self, response: &Envelope) -> Fanout {
        match response.downcast_ref::<R>() {
            Some(typed) => Fanout {
                invoked: self.callbacks.len(),
                faulted: self.notify(typed),
            },
            None => Fanout::default(),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
