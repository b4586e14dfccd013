//! # Error Types
//!
//! Failures a handler reports back to the dispatch worker.

use thiserror::Error;

/// Why a handler could not produce a response.
///
/// Returning any of these is non-fatal: the worker logs it, produces no
/// response for the request, and moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The request content was not acceptable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request was well formed but refused by the handler's rules.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Something went wrong inside the handler.
    #[error("internal handler error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::InvalidRequest`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Shorthand for [`HandlerError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Shorthand for [`HandlerError::Internal`].
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}
