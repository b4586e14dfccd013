//! # Lifecycle Tests
//!
//! The bus as a game system: frame-driven routing, deadlines and shutdown.

#[cfg(test)]
mod tests {
    use super::super::support::{catalog_bus, tick_until};
    use client_runtime::{ClientRuntime, GameLoop, Ping, Pong, RuntimeConfig};
    use parking_lot::Mutex;
    use shared_bus::{BusConfig, BusMetrics, ResponseError};
    use shared_types::{CorrelationId, GameSystem};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Submits one ping per frame.
    struct Pinger {
        requester: shared_bus::Requester,
        next: u64,
    }

    impl GameSystem for Pinger {
        fn name(&self) -> &'static str {
            "pinger"
        }

        fn on_update(&mut self) {
            self.next += 1;
            self.requester.submit(Ping {
                correlation_id: CorrelationId::new(self.next),
            });
        }
    }

    #[tokio::test]
    async fn test_bus_routes_inside_game_loop() {
        let (bus, _) = catalog_bus(BusConfig::default());
        let pongs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pongs);
        bus.subscribe_fn(move |pong: &Pong| sink.lock().push(pong.correlation_id.get()));

        let requester = bus.requester();
        let mut game = GameLoop::new(Duration::from_millis(1));
        game.add_system(bus);
        game.add_system(Pinger { requester, next: 0 });

        timeout(Duration::from_secs(5), game.run(Some(50)))
            .await
            .expect("game loop should finish");
        game.stop();

        // Shutdown routes everything the worker already produced.
        let pongs = pongs.lock();
        assert_eq!(*pongs, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_default_deadline_expires_unanswered_correlation() {
        let config = BusConfig::default().with_request_timeout(Duration::from_millis(20));
        let (bus, _) = catalog_bus(config);

        let orphan = bus.await_response::<Pong>(CorrelationId::new(500));
        let answered = bus.submit_awaiting::<_, Pong>(Ping {
            correlation_id: CorrelationId::new(501),
        });

        tick_until(&bus, || orphan.is_completed() && answered.is_completed());

        assert!(orphan.result().unwrap_err().is_timeout());
        assert!(answered.result().is_ok());
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_shutdown_resolves_pending_and_rejects_new_work() {
        let (bus, _) = catalog_bus(BusConfig::default());

        let orphan = bus.await_response::<Pong>(CorrelationId::new(7));
        bus.shutdown();

        assert_eq!(orphan.result().unwrap_err(), ResponseError::Disconnected);
        assert!(!bus.is_running());

        let late = bus.submit_awaiting::<_, Pong>(Ping {
            correlation_id: CorrelationId::new(8),
        });
        assert_eq!(late.result().unwrap_err(), ResponseError::Disconnected);
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_future_is_awaitable_while_frames_tick() {
        let (bus, _) = catalog_bus(BusConfig::default());
        let bus = Arc::new(bus);

        let future = bus.submit_awaiting::<_, Pong>(Ping {
            correlation_id: CorrelationId::new(3),
        });

        let ticker = Arc::clone(&bus);
        let frames = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(1));
            for _ in 0..1000 {
                interval.tick().await;
                ticker.tick();
            }
        });

        let pong = timeout(Duration::from_secs(5), future)
            .await
            .expect("future should resolve")
            .unwrap();
        assert_eq!(pong.correlation_id, CorrelationId::new(3));
        frames.abort();
    }

    #[tokio::test]
    async fn test_client_runtime_end_to_end() {
        let config = RuntimeConfig {
            frame_interval_ms: 1,
            max_frames: Some(100),
            account: "frank".into(),
            ping_every_frames: 5,
            ..RuntimeConfig::default()
        };
        let metrics = Arc::new(BusMetrics::new());
        let mut runtime = ClientRuntime::new(config, metrics.clone()).unwrap();

        timeout(Duration::from_secs(10), runtime.run())
            .await
            .expect("runtime should finish");
        runtime.shutdown();

        let stats = runtime.stats();
        assert_eq!(stats.account.as_deref(), Some("frank"));
        assert_eq!(stats.box_level, Some(1));
        assert_eq!(stats.failures, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.unroutable, 0);
        assert_eq!(snapshot.handler_faults, 0);
        assert!(snapshot.handled >= 2);
    }
}
