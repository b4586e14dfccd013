//! # Integration Test Flows
//!
//! The demo catalog handlers behind a real bus, exercised end to end.
//!
//! ## Flows Tested:
//!
//! 1. **Ping → Pong**: ordered responses, one future per correlation id
//! 2. **Mixed catalog**: responses leave the worker in submission order
//! 3. **Fan-out**: every subscriber sees every response, in registration order
//! 4. **Unhandled types**: dropped without harming later requests
//! 5. **Fault isolation**: a rejected request does not block the next one

#[cfg(test)]
mod tests {
    use super::super::support::{catalog_bus, tick_until};
    use client_runtime::{
        LoginRequest, LoginResponse, Ping, Pong, UpgradeBoxRequest, UpgradeBoxResponse,
    };
    use parking_lot::Mutex;
    use shared_bus::{BusConfig, ResponseError};
    use shared_types::{CorrelationId, Message, TypeTag};
    use std::sync::Arc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// A request no catalog handler accepts.
    #[derive(Debug)]
    struct Unregistered {
        correlation_id: CorrelationId,
    }

    impl Message for Unregistered {
        fn correlation_id(&self) -> CorrelationId {
            self.correlation_id
        }
    }

    fn ping(raw: u64) -> Ping {
        Ping {
            correlation_id: CorrelationId::new(raw),
        }
    }

    // =============================================================================
    // PING → PONG
    // =============================================================================

    #[test]
    fn test_ping_pong_scenario() {
        let (bus, _) = catalog_bus(BusConfig::default());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_fn(move |pong: &Pong| sink.lock().push(pong.correlation_id));

        let first = bus.await_response::<Pong>(CorrelationId::new(1));
        bus.submit(ping(1));
        bus.submit(ping(2));

        let early = first.result();
        assert!(matches!(early, Err(ResponseError::NotCompleted { .. })));

        tick_until(&bus, || seen.lock().len() == 2);

        assert_eq!(
            *seen.lock(),
            vec![CorrelationId::new(1), CorrelationId::new(2)]
        );

        let pong = first.result().unwrap();
        assert_eq!(pong.correlation_id, CorrelationId::new(1));
        assert!(Arc::ptr_eq(&pong, &first.result().unwrap()));
        assert_eq!(bus.pending_count(), 0);
    }

    // =============================================================================
    // ORDERING ACROSS TYPES
    // =============================================================================

    #[test]
    fn test_mixed_catalog_preserves_submission_order() {
        let (bus, _) = catalog_bus(BusConfig::default());

        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        bus.subscribe_fn(move |r: &Pong| sink.lock().push(r.correlation_id()));
        let sink = Arc::clone(&order);
        bus.subscribe_fn(move |r: &LoginResponse| sink.lock().push(r.correlation_id()));
        let sink = Arc::clone(&order);
        bus.subscribe_fn(move |r: &UpgradeBoxResponse| sink.lock().push(r.correlation_id()));

        let mut expected = Vec::new();
        let id = bus.next_correlation_id();
        bus.submit(LoginRequest {
            correlation_id: id,
            account: "carol".into(),
        });
        expected.push(id);

        for round in 0..5 {
            let id = bus.next_correlation_id();
            if round % 2 == 0 {
                bus.submit(Ping { correlation_id: id });
            } else {
                bus.submit(UpgradeBoxRequest { correlation_id: id });
            }
            expected.push(id);
        }

        tick_until(&bus, || order.lock().len() == expected.len());
        assert_eq!(*order.lock(), expected);
    }

    // =============================================================================
    // FAN-OUT
    // =============================================================================

    #[test]
    fn test_broadcast_fans_out_in_registration_order() {
        let (bus, _) = catalog_bus(BusConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let log = Arc::clone(&log);
                bus.subscribe_fn(move |pong: &Pong| {
                    log.lock().push((name, pong.correlation_id.get()));
                })
            })
            .collect();

        bus.submit(ping(10));
        tick_until(&bus, || log.lock().len() == 3);
        assert_eq!(*log.lock(), vec![("a", 10), ("b", 10), ("c", 10)]);

        assert!(bus.unsubscribe(&handles[1]));
        log.lock().clear();

        bus.submit(ping(11));
        tick_until(&bus, || log.lock().len() == 2);
        assert_eq!(*log.lock(), vec![("a", 11), ("c", 11)]);
        assert_eq!(bus.subscriber_count::<Pong>(), 2);
    }

    // =============================================================================
    // UNHANDLED TYPES
    // =============================================================================

    #[test]
    fn test_unhandled_request_is_dropped_and_worker_survives() {
        let (bus, _) = catalog_bus(BusConfig::default());

        let unhandled = bus.submit_awaiting::<_, Pong>(Unregistered {
            correlation_id: CorrelationId::new(1),
        });
        let pong = bus.submit_awaiting::<_, Pong>(ping(2));

        tick_until(&bus, || unhandled.is_completed() && pong.is_completed());

        assert_eq!(
            unhandled.result().unwrap_err(),
            ResponseError::Unroutable {
                request: TypeTag::of::<Unregistered>()
            }
        );
        assert_eq!(pong.result().unwrap().correlation_id, CorrelationId::new(2));
        assert!(bus.is_running());
    }

    // =============================================================================
    // FAULT ISOLATION
    // =============================================================================

    #[test]
    fn test_rejected_request_does_not_block_later_requests() {
        let (bus, state) = catalog_bus(BusConfig::default());

        let early_upgrade = bus.submit_awaiting::<_, UpgradeBoxResponse>(UpgradeBoxRequest {
            correlation_id: bus.next_correlation_id(),
        });
        let login = bus.submit_awaiting::<_, LoginResponse>(LoginRequest {
            correlation_id: bus.next_correlation_id(),
            account: "dave".into(),
        });
        let upgrade = bus.submit_awaiting::<_, UpgradeBoxResponse>(UpgradeBoxRequest {
            correlation_id: bus.next_correlation_id(),
        });

        tick_until(&bus, || upgrade.is_completed());

        assert!(matches!(
            early_upgrade.result(),
            Err(ResponseError::HandlerFailed { .. })
        ));
        assert_eq!(login.result().unwrap().account, "dave");
        assert_eq!(upgrade.result().unwrap().level, 1);
        assert_eq!(state.box_level(), 1);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_callback_fires_once_and_can_submit_follow_up() {
        let (bus, _) = catalog_bus(BusConfig::default());
        let requester = bus.requester();
        let follow_up = bus.await_response::<Pong>(CorrelationId::new(99));

        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        bus.submit_with_callback(
            LoginRequest {
                correlation_id: bus.next_correlation_id(),
                account: "erin".into(),
            },
            move |_: &LoginResponse| {
                *counter.lock() += 1;
                requester.submit(ping(99));
            },
        );

        tick_until(&bus, || follow_up.is_completed());
        bus.tick();

        assert_eq!(*calls.lock(), 1);
        assert!(follow_up.result().is_ok());
    }
}
