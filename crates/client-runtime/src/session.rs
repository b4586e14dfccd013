//! # Client Session
//!
//! Two game systems share one [`MessageBus`]:
//!
//! - [`NetworkSystem`] ticks the bus each frame and shuts it down on destroy.
//! - [`ClientSession`] plays the client: it logs in, upgrades its box once
//!   the login resolves, then pings on a fixed cadence.
//!
//! ```text
//! on_start   ─▶ submit_awaiting(LoginRequest)
//! on_update  ─▶ login resolved? ─▶ submit_with_callback(UpgradeBoxRequest)
//!            ─▶ every N frames  ─▶ submit(Ping)      (Pong counted by subscription)
//! ```

use crate::catalog::{
    LoginRequest, LoginResponse, Ping, Pong, UpgradeBoxRequest, UpgradeBoxResponse,
};
use parking_lot::Mutex;
use shared_bus::{Callback, MessageBus, ResponseFuture};
use shared_types::GameSystem;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ticks a shared bus as part of the game loop.
pub struct NetworkSystem {
    bus: Arc<MessageBus>,
}

impl NetworkSystem {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

impl GameSystem for NetworkSystem {
    fn name(&self) -> &'static str {
        "network"
    }

    fn on_update(&mut self) {
        let report = self.bus.tick();
        if report.callback_faults > 0 {
            warn!(faults = report.callback_faults, "Response callbacks panicked");
        }
    }

    fn on_destroy(&mut self) {
        self.bus.shutdown();
    }
}

/// What the session has learned from the server so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub account: Option<String>,
    pub box_level: Option<u32>,
    pub pings_sent: u64,
    pub pongs_received: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    LoggingIn,
    Ready,
    Failed,
}

/// Scripted client driving the demo catalog.
pub struct ClientSession {
    bus: Arc<MessageBus>,
    account: String,
    ping_every_frames: u64,
    phase: Phase,
    frame: u64,
    login: Option<ResponseFuture<LoginResponse>>,
    pong_listener: Option<Callback<Pong>>,
    stats: Arc<Mutex<SessionStats>>,
}

impl ClientSession {
    pub fn new(bus: Arc<MessageBus>, account: impl Into<String>, ping_every_frames: u64) -> Self {
        Self {
            bus,
            account: account.into(),
            ping_every_frames: ping_every_frames.max(1),
            phase: Phase::Idle,
            frame: 0,
            login: None,
            pong_listener: None,
            stats: Arc::new(Mutex::new(SessionStats::default())),
        }
    }

    /// Shared view of the session's progress.
    pub fn stats(&self) -> Arc<Mutex<SessionStats>> {
        Arc::clone(&self.stats)
    }

    /// Whether login succeeded.
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    fn poll_login(&mut self) {
        let Some(login) = &self.login else {
            return;
        };
        if !login.is_completed() {
            return;
        }

        match login.result() {
            Ok(response) => {
                info!(
                    account = %response.account,
                    box_level = response.box_level,
                    "Logged in"
                );
                {
                    let mut stats = self.stats.lock();
                    stats.account = Some(response.account.clone());
                    stats.box_level = Some(response.box_level);
                }
                self.phase = Phase::Ready;
                self.upgrade_box();
            }
            Err(error) => {
                warn!(account = %self.account, %error, "Login failed");
                self.stats.lock().failures += 1;
                self.phase = Phase::Failed;
            }
        }
        self.login = None;
    }

    fn upgrade_box(&self) {
        let request = UpgradeBoxRequest {
            correlation_id: self.bus.next_correlation_id(),
        };
        let stats = Arc::clone(&self.stats);
        self.bus
            .submit_with_callback(request, move |response: &UpgradeBoxResponse| {
                info!(level = response.level, "Box upgraded");
                stats.lock().box_level = Some(response.level);
            });
    }

    fn ping(&self) {
        self.bus.submit(Ping {
            correlation_id: self.bus.next_correlation_id(),
        });
        self.stats.lock().pings_sent += 1;
    }
}

impl GameSystem for ClientSession {
    fn name(&self) -> &'static str {
        "client-session"
    }

    fn on_start(&mut self) {
        let stats = Arc::clone(&self.stats);
        self.pong_listener = Some(self.bus.subscribe_fn(move |_: &Pong| {
            stats.lock().pongs_received += 1;
        }));

        let request = LoginRequest {
            correlation_id: self.bus.next_correlation_id(),
            account: self.account.clone(),
        };
        debug!(account = %self.account, correlation_id = %request.correlation_id, "Logging in");
        self.login = Some(self.bus.submit_awaiting(request));
        self.phase = Phase::LoggingIn;
    }

    fn on_update(&mut self) {
        self.frame += 1;

        match self.phase {
            Phase::LoggingIn => self.poll_login(),
            Phase::Ready if self.frame % self.ping_every_frames == 0 => self.ping(),
            _ => {}
        }
    }

    fn on_destroy(&mut self) {
        if let Some(listener) = self.pong_listener.take() {
            self.bus.unsubscribe(&listener);
        }
        let stats = self.stats.lock();
        info!(
            pings = stats.pings_sent,
            pongs = stats.pongs_received,
            box_level = ?stats.box_level,
            "Client session ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{register_catalog, ServerState};
    use shared_bus::ResponseError;
    use std::time::{Duration, Instant};

    fn bus() -> Arc<MessageBus> {
        Arc::new(
            register_catalog(MessageBus::builder(), &ServerState::new())
                .unwrap()
                .start()
                .unwrap(),
        )
    }

    fn run_frames_until(
        network: &mut NetworkSystem,
        session: &mut ClientSession,
        mut done: impl FnMut(&ClientSession) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(session) {
            assert!(Instant::now() < deadline, "session did not progress");
            network.on_update();
            session.on_update();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_session_logs_in_upgrades_and_pings() {
        let bus = bus();
        let mut network = NetworkSystem::new(Arc::clone(&bus));
        let mut session = ClientSession::new(Arc::clone(&bus), "alice", 2);
        let stats = session.stats();

        session.on_start();
        assert_eq!(bus.subscriber_count::<Pong>(), 1);

        run_frames_until(&mut network, &mut session, |s| {
            let stats = s.stats.lock();
            s.is_ready() && stats.box_level == Some(1) && stats.pongs_received >= 2
        });

        let snapshot = stats.lock().clone();
        assert_eq!(snapshot.account.as_deref(), Some("alice"));
        assert_eq!(snapshot.failures, 0);
        assert!(snapshot.pings_sent >= snapshot.pongs_received);

        session.on_destroy();
        assert_eq!(bus.subscriber_count::<Pong>(), 0);
        network.on_destroy();
        assert!(!bus.is_running());
    }

    #[test]
    fn test_blank_account_fails_login() {
        let bus = bus();
        let mut network = NetworkSystem::new(Arc::clone(&bus));
        let mut session = ClientSession::new(Arc::clone(&bus), "  ", 1);

        session.on_start();
        run_frames_until(&mut network, &mut session, |s| s.phase != Phase::LoggingIn);

        assert_eq!(session.phase, Phase::Failed);
        assert_eq!(session.stats().lock().failures, 1);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_login_after_shutdown_is_disconnected() {
        let bus = bus();
        bus.shutdown();

        let mut session = ClientSession::new(Arc::clone(&bus), "alice", 1);
        session.on_start();

        let login = session.login.as_ref().unwrap();
        assert!(login.is_completed());
        assert!(matches!(login.result(), Err(ResponseError::Disconnected)));

        session.on_update();
        assert_eq!(session.phase, Phase::Failed);
    }
}
