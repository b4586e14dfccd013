//! # Server-Side Handlers
//!
//! One handler per catalog request type. [`register_catalog`] binds all of
//! them and declares each request type as required, so a missing binding
//! stops the bus from starting.

use crate::catalog::{
    LoginRequest, LoginResponse, Ping, Pong, UpgradeBoxRequest, UpgradeBoxResponse,
};
use parking_lot::Mutex;
use shared_bus::{ConfigurationError, MessageBusBuilder, MessageHandler};
use shared_types::HandlerError;
use std::sync::Arc;
use tracing::info;

/// Highest level a box can reach.
pub const MAX_BOX_LEVEL: u32 = 10;

/// Server-side account state shared by the handlers.
#[derive(Debug, Default)]
pub struct ServerState {
    account: Mutex<Option<String>>,
    box_level: Mutex<u32>,
}

impl ServerState {
    /// Fresh state with no active session.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Account of the active session.
    pub fn account(&self) -> Option<String> {
        self.account.lock().clone()
    }

    /// Current box level.
    pub fn box_level(&self) -> u32 {
        *self.box_level.lock()
    }
}

/// Answers [`Ping`] with a [`Pong`] carrying the same id.
pub struct PingHandler;

impl MessageHandler for PingHandler {
    type Request = Ping;
    type Response = Pong;

    fn handle(&self, request: &Ping) -> Result<Pong, HandlerError> {
        Ok(Pong {
            correlation_id: request.correlation_id,
        })
    }

    fn name(&self) -> &'static str {
        "PingHandler"
    }
}

/// Opens a session for a non-empty account name.
pub struct LoginHandler {
    state: Arc<ServerState>,
}

impl LoginHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }
}

impl MessageHandler for LoginHandler {
    type Request = LoginRequest;
    type Response = LoginResponse;

    fn handle(&self, request: &LoginRequest) -> Result<LoginResponse, HandlerError> {
        let account = request.account.trim();
        if account.is_empty() {
            return Err(HandlerError::invalid("account name is empty"));
        }

        *self.state.account.lock() = Some(account.to_string());
        info!(account, "Account logged in");

        Ok(LoginResponse {
            correlation_id: request.correlation_id,
            account: account.to_string(),
            box_level: self.state.box_level(),
        })
    }

    fn name(&self) -> &'static str {
        "LoginHandler"
    }
}

/// Raises the box level of the logged-in account.
pub struct UpgradeBoxHandler {
    state: Arc<ServerState>,
}

impl UpgradeBoxHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }
}

impl MessageHandler for UpgradeBoxHandler {
    type Request = UpgradeBoxRequest;
    type Response = UpgradeBoxResponse;

    fn handle(&self, request: &UpgradeBoxRequest) -> Result<UpgradeBoxResponse, HandlerError> {
        if self.state.account.lock().is_none() {
            return Err(HandlerError::rejected("no account logged in"));
        }

        let mut level = self.state.box_level.lock();
        if *level >= MAX_BOX_LEVEL {
            return Err(HandlerError::rejected(format!(
                "box already at max level {MAX_BOX_LEVEL}"
            )));
        }
        *level += 1;

        Ok(UpgradeBoxResponse {
            correlation_id: request.correlation_id,
            level: *level,
        })
    }

    fn name(&self) -> &'static str {
        "UpgradeBoxHandler"
    }
}

/// Bind every catalog handler against `state`.
pub fn register_catalog(
    builder: MessageBusBuilder,
    state: &Arc<ServerState>,
) -> Result<MessageBusBuilder, ConfigurationError> {
    builder
        .require::<Ping>()
        .require::<LoginRequest>()
        .require::<UpgradeBoxRequest>()
        .handler(PingHandler)?
        .handler(LoginHandler::new(Arc::clone(state)))?
        .handler(UpgradeBoxHandler::new(Arc::clone(state)))
}
