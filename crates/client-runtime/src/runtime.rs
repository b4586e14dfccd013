//! # Client Runtime
//!
//! Owns the shared bus and the game loop built around it.
//!
//! ## Startup Sequence
//!
//! 1. Bind every catalog handler against fresh server state
//! 2. Start the bus (validates config, spawns the dispatch worker)
//! 3. Register systems: network first, then the client session
//! 4. Run frames until the limit or a shutdown signal
//! 5. Destroy systems, which shuts the bus down

use crate::config::RuntimeConfig;
use crate::game_loop::GameLoop;
use crate::handlers::{register_catalog, ServerState};
use crate::session::{ClientSession, NetworkSystem, SessionStats};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use shared_bus::{MessageBus, MetricsRecorder};
use std::sync::Arc;
use tracing::info;

/// A running client: bus, server state and game loop.
pub struct ClientRuntime {
    config: RuntimeConfig,
    bus: Arc<MessageBus>,
    server: Arc<ServerState>,
    game: GameLoop,
    stats: Arc<Mutex<SessionStats>>,
}

impl ClientRuntime {
    /// Build the bus and register the game systems.
    pub fn new(config: RuntimeConfig, metrics: Arc<dyn MetricsRecorder>) -> Result<Self> {
        let server = ServerState::new();
        let bus = register_catalog(MessageBus::builder(), &server)
            .context("failed to bind catalog handlers")?
            .config(config.bus.clone())
            .metrics(metrics)
            .start()
            .context("failed to start message bus")?;
        let bus = Arc::new(bus);

        let session = ClientSession::new(
            Arc::clone(&bus),
            config.account.clone(),
            config.ping_every_frames,
        );
        let stats = session.stats();

        let mut game = GameLoop::new(config.frame_interval());
        game.add_system(NetworkSystem::new(Arc::clone(&bus)));
        game.add_system(session);

        info!(
            handlers = bus.registry().len(),
            frame_interval_ms = config.frame_interval_ms,
            max_frames = ?config.max_frames,
            "Client runtime ready"
        );

        Ok(Self {
            config,
            bus,
            server,
            game,
            stats,
        })
    }

    /// Run frames until the configured limit.
    pub async fn run(&mut self) {
        self.game.run(self.config.max_frames).await;
    }

    /// Destroy every system. The bus is shut down by the network system.
    pub fn shutdown(&mut self) {
        self.game.stop();
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn server(&self) -> &Arc<ServerState> {
        &self.server
    }

    pub fn frames(&self) -> u64 {
        self.game.frame()
    }

    /// Snapshot of the client session's progress.
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }
}
