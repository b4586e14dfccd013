//! # Demo Message Catalog
//!
//! Request/response pairs the client runtime exchanges with its in-process
//! server. Every request carries the correlation id its response echoes.
//!
//! | Request | Response |
//! |---------|----------|
//! | [`Ping`] | [`Pong`] |
//! | [`LoginRequest`] | [`LoginResponse`] |
//! | [`UpgradeBoxRequest`] | [`UpgradeBoxResponse`] |

use serde::{Deserialize, Serialize};
use shared_types::{CorrelationId, Message};

/// Implement [`Message`] for types with a `correlation_id` field.
macro_rules! impl_message {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Message for $ty {
                fn correlation_id(&self) -> CorrelationId {
                    self.correlation_id
                }
            }
        )+
    };
}

/// Liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub correlation_id: CorrelationId,
}

/// Answer to a [`Ping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub correlation_id: CorrelationId,
}

/// Open a session for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub correlation_id: CorrelationId,
    pub account: String,
}

/// Session opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub correlation_id: CorrelationId,
    pub account: String,
    /// Current level of the account's box.
    pub box_level: u32,
}

/// Raise the account's box by one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeBoxRequest {
    pub correlation_id: CorrelationId,
}

/// Box level after an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeBoxResponse {
    pub correlation_id: CorrelationId,
    pub level: u32,
}

impl_message!(
    Ping,
    Pong,
    LoginRequest,
    LoginResponse,
    UpgradeBoxRequest,
    UpgradeBoxResponse,
);
