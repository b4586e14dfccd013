//! # Shared Types Crate
//!
//! The message contract shared by every producer, handler and consumer of
//! the dispatch core.
//!
//! ## Design Principles
//!
//! - **Type is the key**: a message's concrete type selects its handler
//!   (requests) or its broadcast subscribers (responses).
//! - **Correlation is the link**: a response carries the correlation id of
//!   the request that produced it, and nothing else ties the two together.
//! - **Erase once**: messages are wrapped in an [`Envelope`] when they enter
//!   a queue and recovered with a typed downcast when they leave it.

pub mod envelope;
pub mod errors;
pub mod message;
pub mod system;

pub use envelope::Envelope;
pub use errors::HandlerError;
pub use message::{CorrelationId, CorrelationIdAllocator, Message, TypeTag};
pub use system::GameSystem;
