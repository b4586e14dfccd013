//! # Client Runtime
//!
//! Frame-driven host for the message bus.
//!
//! ## Modular Structure
//!
//! - `catalog` - Request/response types exchanged with the in-process server
//! - `handlers` - Server-side handlers and their shared account state
//! - `config` - Runtime configuration from file or environment
//! - `game_loop` - Fixed-interval driver for game systems
//! - `session` - Network system and the scripted client session
//! - `runtime` - Wiring of the above into one runnable unit
//!
//! ## Frame Flow
//!
//! ```text
//! GameLoop frame
//!   ├─ NetworkSystem.on_update  → bus.tick()  → callbacks, futures, subscribers
//!   └─ ClientSession.on_update  → submit login / upgrade / ping
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod catalog;
pub mod config;
pub mod game_loop;
pub mod handlers;
pub mod runtime;
pub mod session;

pub use catalog::{
    LoginRequest, LoginResponse, Ping, Pong, UpgradeBoxRequest, UpgradeBoxResponse,
};
pub use config::{ConfigError, RuntimeConfig};
pub use game_loop::GameLoop;
pub use handlers::{register_catalog, ServerState, MAX_BOX_LEVEL};
pub use runtime::ClientRuntime;
pub use session::{ClientSession, NetworkSystem, SessionStats};
