//! # Message Contract
//!
//! The minimal shape every request and response implements: a correlation
//! identifier and a concrete runtime type.
//!
//! ## Design Rules
//!
//! - The concrete type of a request is its handler-registry key.
//! - The concrete type of a response is its broadcast-subscription key.
//! - A request and its response are distinct types; the correlation id is
//!   the only link between a specific request and its specific response.

use serde::{Deserialize, Serialize};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// A typed request or response travelling through the dispatch core.
///
/// Implementors must be `Send + Sync` because requests cross from the caller
/// to the worker thread, and responses are shared between every callback
/// that observes them.
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// The correlation id linking a request to its response.
    fn correlation_id(&self) -> CorrelationId;
}

/// Caller-assigned integer linking one request to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CorrelationId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<CorrelationId> for u64 {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

/// Monotonic allocator for correlation ids.
///
/// The dispatch core does not enforce uniqueness itself; producers that share
/// one allocator never hand out the same id twice within a run.
#[derive(Debug)]
pub struct CorrelationIdAllocator {
    next: AtomicU64,
}

impl CorrelationIdAllocator {
    /// Create an allocator whose first id is `1`.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create an allocator whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Hand out the next id.
    pub fn next_id(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Peek at the id the next call will return.
    #[must_use]
    pub fn peek(&self) -> CorrelationId {
        CorrelationId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for CorrelationIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile-time identity of a concrete message type.
///
/// Equality and hashing use the `TypeId` only; the name is carried for logs.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// The tag of `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name (`Pong` for `client::catalog::Pong`).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Whether this tag identifies `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeTag").field(&self.name).finish()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
