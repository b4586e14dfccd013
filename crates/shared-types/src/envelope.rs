//! # Envelope
//!
//! Type-erased wrapper for messages moving through the queues. The payload
//! is reference counted so a single response can be handed to every
//! broadcast subscriber and every correlation waiter without copying.

use crate::message::{CorrelationId, Message, TypeTag};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A message whose concrete type has been erased.
#[derive(Clone)]
pub struct Envelope {
    tag: TypeTag,
    correlation_id: CorrelationId,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Envelope {
    /// Erase `message`, capturing its type tag and correlation id.
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            tag: TypeTag::of::<M>(),
            correlation_id: message.correlation_id(),
            payload: Arc::new(message),
        }
    }

    /// Concrete type of the wrapped message.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Correlation id of the wrapped message.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Whether the payload is an `M`.
    #[must_use]
    pub fn is<M: Message>(&self) -> bool {
        self.tag.is::<M>()
    }

    /// Borrow the payload as `M`.
    #[must_use]
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    /// Share the payload as `Arc<M>`.
    #[must_use]
    pub fn downcast<M: Message>(&self) -> Option<Arc<M>> {
        Arc::clone(&self.payload).downcast::<M>().ok()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("type", &self.tag.short_name())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}
