//! Cross-crate flows: `client-runtime` handlers behind a real `shared-bus`.

pub mod flows;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod support {
    use client_runtime::{register_catalog, ServerState};
    use shared_bus::{BusConfig, MessageBus};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// A bus serving the demo catalog, plus the server state behind it.
    pub fn catalog_bus(config: BusConfig) -> (MessageBus, Arc<ServerState>) {
        let state = ServerState::new();
        let bus = register_catalog(MessageBus::builder(), &state)
            .unwrap()
            .config(config)
            .start()
            .unwrap();
        (bus, state)
    }

    /// Tick until `done` holds, failing after five seconds.
    pub fn tick_until(bus: &MessageBus, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            bus.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
