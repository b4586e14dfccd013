//! # Handler Registry
//!
//! Maps a request's concrete type to the single handler that produces its
//! response. Built once at startup through [`HandlerRegistryBuilder`]; after
//! [`build`](HandlerRegistryBuilder::build) it is immutable and shared with
//! the dispatch worker without any locking.
//!
//! Each binding stores a type-erased invoker, so dispatch is one hash lookup
//! on the request's [`TypeTag`] followed by one typed downcast.

use crate::error::ConfigurationError;
use shared_types::{Envelope, HandlerError, Message, TypeTag};
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Produces exactly one response for each request of one concrete type.
///
/// Handlers run synchronously on the dispatch worker, one request at a time.
/// A slow handler delays every request queued behind it.
pub trait MessageHandler: Send + Sync + 'static {
    /// The request type this handler claims.
    type Request: Message;
    /// The response type this handler produces.
    type Response: Message;

    /// Handle one request.
    fn handle(&self, request: &Self::Request) -> Result<Self::Response, HandlerError>;

    /// Name used in logs and configuration errors.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

type ErasedInvoker = Box<dyn Fn(&Envelope) -> Result<Envelope, HandlerError> + Send + Sync>;

/// One request type bound to one handler.
pub struct HandlerBinding {
    handler_name: &'static str,
    request: TypeTag,
    response: TypeTag,
    invoke: ErasedInvoker,
}

impl HandlerBinding {
    fn new<H: MessageHandler>(handler: H) -> Self {
        let handler_name = handler.name();
        let invoke: ErasedInvoker = Box::new(move |envelope: &Envelope| {
            let request = envelope.downcast_ref::<H::Request>().ok_or_else(|| {
                HandlerError::internal(format!(
                    "expected {}, received {}",
                    TypeTag::of::<H::Request>(),
                    envelope.tag()
                ))
            })?;
            handler.handle(request).map(Envelope::new)
        });

        Self {
            handler_name,
            request: TypeTag::of::<H::Request>(),
            response: TypeTag::of::<H::Response>(),
            invoke,
        }
    }

    /// Name of the bound handler.
    #[must_use]
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Request type the handler claims.
    #[must_use]
    pub fn request(&self) -> TypeTag {
        self.request
    }

    /// Response type the handler produces.
    #[must_use]
    pub fn response(&self) -> TypeTag {
        self.response
    }

    /// Run the handler against an erased request.
    pub fn invoke(&self, request: &Envelope) -> Result<Envelope, HandlerError> {
        (self.invoke)(request)
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("handler", &self.handler_name)
            .field("request", &self.request)
            .field("response", &self.response)
            .finish()
    }
}

/// Immutable request-type to handler table.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    bindings: HashMap<TypeTag, HandlerBinding>,
}

impl HandlerRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// The binding for `request`, if any handler claims it.
    #[must_use]
    pub fn resolve(&self, request: TypeTag) -> Option<&HandlerBinding> {
        self.bindings.get(&request)
    }

    /// Whether a handler claims `R`.
    #[must_use]
    pub fn contains<R: Message>(&self) -> bool {
        self.bindings.contains_key(&TypeTag::of::<R>())
    }

    /// Number of bound request types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no handler is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Every bound request type.
    pub fn request_types(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.bindings.keys().copied()
    }
}

/// Collects handler bindings before the worker starts.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    bindings: HashMap<TypeTag, HandlerBinding>,
    required: Vec<TypeTag>,
}

impl HandlerRegistryBuilder {
    /// Bind `handler` to its request type.
    ///
    /// # Errors
    ///
    /// `DuplicateHandler` if another handler already claims the request type.
    pub fn register<H: MessageHandler>(mut self, handler: H) -> Result<Self, ConfigurationError> {
        let binding = HandlerBinding::new(handler);
        let request = binding.request;

        if let Some(existing) = self.bindings.get(&request) {
            return Err(ConfigurationError::DuplicateHandler {
                request: request.short_name(),
                existing: existing.handler_name,
                rejected: binding.handler_name,
            });
        }

        debug!(
            request = %request,
            response = %binding.response,
            handler = binding.handler_name,
            "Handler bound"
        );
        self.bindings.insert(request, binding);
        Ok(self)
    }

    /// Bind a closure as the handler for `Req`.
    ///
    /// # Errors
    ///
    /// `DuplicateHandler` if another handler already claims `Req`.
    pub fn register_fn<Req, Resp, F>(self, handler: F) -> Result<Self, ConfigurationError>
    where
        Req: Message,
        Resp: Message,
        F: Fn(&Req) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        self.register(FnHandler {
            handler,
            _types: PhantomData,
        })
    }

    /// Declare that `Req` must have a handler when the registry is built.
    #[must_use]
    pub fn require<Req: Message>(mut self) -> Self {
        self.required.push(TypeTag::of::<Req>());
        self
    }

    /// Freeze the bindings.
    ///
    /// # Errors
    ///
    /// `MissingHandler` for the first required request type left unbound.
    pub fn build(self) -> Result<HandlerRegistry, ConfigurationError> {
        if let Some(missing) = self
            .required
            .iter()
            .find(|tag| !self.bindings.contains_key(tag))
        {
            return Err(ConfigurationError::MissingHandler {
                request: missing.short_name(),
            });
        }

        Ok(HandlerRegistry {
            bindings: self.bindings,
        })
    }
}

/// Adapter that lets a plain closure act as a [`MessageHandler`].
struct FnHandler<Req, Resp, F> {
    handler: F,
    _types: PhantomData<fn(&Req) -> Resp>,
}

impl<Req, Resp, F> MessageHandler for FnHandler<Req, Resp, F>
where
    Req: Message,
    Resp: Message,
    F: Fn(&Req) -> Result<Resp, HandlerError> + Send + Sync + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn handle(&self, request: &Req) -> Result<Resp, HandlerError> {
        (self.handler)(request)
    }

    fn name(&self) -> &'static str {
        type_name::<F>()
    }
}
