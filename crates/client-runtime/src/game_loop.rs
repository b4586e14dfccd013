//! # Game Loop
//!
//! Drives a fixed list of [`GameSystem`]s at a fixed frame interval.
//!
//! ```text
//! start()  → on_start   for each system, in order
//! frame()  → on_update  for each system, in order   (once per interval)
//! stop()   → on_destroy for each system, in order
//! ```
//!
//! Systems added earlier see each frame first; add the network system
//! before anything that reads responses so they are routed the same frame.

use shared_types::GameSystem;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// Fixed-interval driver for game systems.
pub struct GameLoop {
    systems: Vec<Box<dyn GameSystem>>,
    interval: Duration,
    frame: u64,
    started: bool,
}

impl GameLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            systems: Vec::new(),
            interval,
            frame: 0,
            started: false,
        }
    }

    /// Append a system. Systems update in the order they were added.
    pub fn add_system<S: GameSystem + 'static>(&mut self, system: S) {
        debug!(system = system.name(), "System added");
        self.systems.push(Box::new(system));
    }

    /// Frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Call `on_start` on every system. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        for system in &mut self.systems {
            system.on_start();
        }
        info!(systems = self.systems.len(), "Game loop started");
    }

    /// Run one frame immediately.
    pub fn frame_once(&mut self) {
        self.frame += 1;
        for system in &mut self.systems {
            system.on_update();
        }
    }

    /// Run frames at the configured interval until `max_frames` is reached,
    /// or forever when it is `None`.
    pub async fn run(&mut self, max_frames: Option<u64>) {
        self.start();

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if max_frames.is_some_and(|max| self.frame >= max) {
                break;
            }
            ticker.tick().await;
            self.frame_once();
        }

        info!(frames = self.frame, "Game loop finished");
    }

    /// Call `on_destroy` on every system and drop them.
    pub fn stop(&mut self) {
        for system in &mut self.systems {
            system.on_destroy();
        }
        self.systems.clear();
        info!(frames = self.frame, "Game loop stopped");
    }
}
