//! Connection lifecycle state machine with bounded exponential backoff.
//!
//! The manager owns the push channel instance and the [`ConnectionInfo`]
//! snapshot. It never sleeps itself: scheduling decisions are returned as
//! [`ConnectionSignal`]s so the driving event loop controls the timer and can
//! cancel it on manual disconnect or on becoming connected.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_shared::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_MS, DEFAULT_RECONNECT_MAX_MS,
};
use parley_shared::events::{ClientEvent, DisconnectReason, PushEvent};
use parley_shared::notify::{NoticeKind, Notifier};
use parley_shared::types::{ConnectionInfo, ConnectionState};

use crate::error::Result;
use crate::push::{PushChannel, PushChannelFactory};

/// Reconnection parameters. Process-wide with fixed defaults, overridable at
/// initialization or from the environment.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Env: `PARLEY_RECONNECT_BASE_MS`. Default: 1000.
    pub base_delay: Duration,
    /// Env: `PARLEY_RECONNECT_MAX_MS`. Default: 30000.
    pub max_delay: Duration,
    /// Env: `PARLEY_RECONNECT_MAX_ATTEMPTS`. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on missing or invalid values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PARLEY_RECONNECT_BASE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.base_delay = Duration::from_millis(ms),
                Err(_) => warn!(value = %val, "Invalid PARLEY_RECONNECT_BASE_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("PARLEY_RECONNECT_MAX_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.max_delay = Duration::from_millis(ms),
                Err(_) => warn!(value = %val, "Invalid PARLEY_RECONNECT_MAX_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("PARLEY_RECONNECT_MAX_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(n) => config.max_attempts = n,
                Err(_) => {
                    warn!(value = %val, "Invalid PARLEY_RECONNECT_MAX_ATTEMPTS, using default")
                }
            }
        }

        config
    }
}

/// Backoff delay for the given attempt number: `min(base * 2^attempts, max)`.
pub fn backoff_delay(config: &ReconnectConfig, attempts: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempts);
    let delay_ms = (config.base_delay.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(delay_ms.min(config.max_delay.as_millis() as u64))
}

/// Instruction for the driving event loop after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// Now connected: cancel any reconnect timer and drain the offline queue.
    BecameConnected,
    /// Arm a reconnect timer; call [`ConnectionManager::connect`] when it
    /// fires.
    ScheduleReconnect(Duration),
    /// Attempt budget exhausted; only a manual reconnect recovers.
    GaveUp,
}

/// Owns the push channel instance and the connection state machine.
pub struct ConnectionManager {
    factory: PushChannelFactory,
    events_tx: mpsc::Sender<PushEvent>,
    channel: Option<Box<dyn PushChannel>>,
    info: Arc<Mutex<ConnectionInfo>>,
    config: ReconnectConfig,
    notifier: Arc<dyn Notifier>,
    /// Set by `disconnect()`; suppresses auto-reconnect until the next
    /// `connect()`/`reconnect()`.
    manual_disconnect: bool,
}

impl ConnectionManager {
    pub fn new(
        factory: PushChannelFactory,
        events_tx: mpsc::Sender<PushEvent>,
        config: ReconnectConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            factory,
            events_tx,
            channel: None,
            info: Arc::new(Mutex::new(ConnectionInfo::default())),
            config,
            notifier,
            manual_disconnect: false,
        }
    }

    /// Shared read-only view of the connection state. Only the manager
    /// writes through it.
    pub fn info_handle(&self) -> Arc<Mutex<ConnectionInfo>> {
        Arc::clone(&self.info)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_info().state
    }

    fn lock_info(&self) -> std::sync::MutexGuard<'_, ConnectionInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a fresh channel instance and start connecting.
    ///
    /// Idempotent: a call while already connecting or connected is a no-op.
    pub fn connect(&mut self) {
        match self.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!("connect() ignored, already connecting or connected");
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
        }

        // Replace, never reuse: the previous instance is closed first so it
        // stops delivering events before the new one starts.
        if let Some(mut old) = self.channel.take() {
            old.close();
        }

        self.manual_disconnect = false;
        self.lock_info().state = ConnectionState::Connecting;

        let mut channel = (self.factory)(self.events_tx.clone());
        channel.open();
        self.channel = Some(channel);
        info!("Push channel connecting");
    }

    /// Manual disconnect: tears the channel down and stays disconnected for
    /// the rest of the session unless `connect()`/`reconnect()` is called.
    pub fn disconnect(&mut self) {
        self.manual_disconnect = true;
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }

        let mut info = self.lock_info();
        info.state = ConnectionState::Disconnected;
        info.reconnect_attempts = 0;
        info.current_delay_ms = 0;
        info!("Push channel disconnected (manual)");
    }

    /// Manual retry after the attempt budget was exhausted: resets the
    /// counter and connects again.
    pub fn reconnect(&mut self) {
        {
            let mut info = self.lock_info();
            info.reconnect_attempts = 0;
            info.current_delay_ms = 0;
        }
        self.manual_disconnect = false;
        self.connect();
    }

    /// Emit a client event over the current channel, if connected.
    pub fn emit(&mut self, event: &ClientEvent) -> Result<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.emit(event),
            None => Err(crate::error::NetError::Channel(
                "push channel not open".to_string(),
            )),
        }
    }

    /// Feed a lifecycle event from the channel through the state machine.
    ///
    /// Non-lifecycle events are ignored here; they belong to the event
    /// processor.
    pub fn handle_push(&mut self, event: &PushEvent) -> Option<ConnectionSignal> {
        match event {
            PushEvent::Connected => {
                let mut info = self.lock_info();
                info.state = ConnectionState::Connected;
                info.reconnect_attempts = 0;
                info.current_delay_ms = 0;
                drop(info);
                info!("Push channel connected");
                Some(ConnectionSignal::BecameConnected)
            }

            PushEvent::ConnectError { message } => {
                warn!(error = %message, "Push channel connect error");
                self.lock_info().state = ConnectionState::Disconnected;
                if self.manual_disconnect {
                    return None;
                }
                self.schedule_reconnect()
            }

            PushEvent::Disconnected { reason } => {
                self.lock_info().state = ConnectionState::Disconnected;
                match reason {
                    DisconnectReason::Manual => {
                        debug!("Push channel closed by client");
                        None
                    }
                    DisconnectReason::Transport(why) => {
                        info!(reason = %why, "Push channel dropped");
                        if self.manual_disconnect {
                            return None;
                        }
                        self.schedule_reconnect()
                    }
                }
            }

            _ => None,
        }
    }

    /// Decide whether another reconnection attempt is allowed, and with what
    /// delay. Increments the attempt counter on every scheduling decision.
    fn schedule_reconnect(&mut self) -> Option<ConnectionSignal> {
        let mut info = self.lock_info();
        if info.reconnect_attempts >= self.config.max_attempts {
            info.state = ConnectionState::Disconnected;
            drop(info);
            warn!(
                attempts = self.config.max_attempts,
                "Reconnection attempts exhausted"
            );
            self.notifier.notify(
                NoticeKind::Error,
                "Unable to reconnect. Retry the connection manually.",
            );
            return Some(ConnectionSignal::GaveUp);
        }

        let delay = backoff_delay(&self.config, info.reconnect_attempts);
        info.state = ConnectionState::Reconnecting;
        info.reconnect_attempts += 1;
        info.current_delay_ms = delay.as_millis() as u64;
        let attempt = info.reconnect_attempts;
        drop(info);

        info!(
            attempt,
            max = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection"
        );
        Some(ConnectionSignal::ScheduleReconnect(delay))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parley_shared::notify::LogNotifier;

    use super::*;

    #[derive(Default)]
    struct ChannelLog {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct MockChannel {
        log: Arc<ChannelLog>,
    }

    impl PushChannel for MockChannel {
        fn open(&mut self) {
            self.log.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&mut self) {
            self.log.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn emit(&mut self, _event: &ClientEvent) -> Result<()> {
            Ok(())
        }
    }

    fn manager_with_log() -> (ConnectionManager, Arc<ChannelLog>, Arc<AtomicUsize>) {
        let log = Arc::new(ChannelLog::default());
        let built = Arc::new(AtomicUsize::new(0));
        let factory_log = Arc::clone(&log);
        let factory_built = Arc::clone(&built);
        let factory: PushChannelFactory = Box::new(move |_tx| {
            factory_built.fetch_add(1, Ordering::SeqCst);
            Box::new(MockChannel {
                log: Arc::clone(&factory_log),
            })
        });
        let (tx, _rx) = mpsc::channel(16);
        let manager =
            ConnectionManager::new(factory, tx, ReconnectConfig::default(), Arc::new(LogNotifier));
        (manager, log, built)
    }

    fn transport_drop() -> PushEvent {
        PushEvent::Disconnected {
            reason: DisconnectReason::Transport("transport close".to_string()),
        }
    }

    #[test]
    fn test_backoff_sequence() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..5)
            .map(|n| backoff_delay(&config, n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        // The cap kicks in once the doubling passes 30s.
        assert_eq!(backoff_delay(&config, 5).as_millis(), 30000);
        assert_eq!(backoff_delay(&config, 12).as_millis(), 30000);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mut manager, _log, built) = manager_with_log();
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        manager.connect();
        manager.connect();
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transport_connect_resets_attempts() {
        let (mut manager, _log, _built) = manager_with_log();
        manager.connect();
        manager.handle_push(&transport_drop());
        assert_eq!(manager.state(), ConnectionState::Reconnecting);

        let signal = manager.handle_push(&PushEvent::Connected);
        assert_eq!(signal, Some(ConnectionSignal::BecameConnected));
        let info = manager.lock_info();
        assert_eq!(info.state, ConnectionState::Connected);
        assert_eq!(info.reconnect_attempts, 0);
        assert_eq!(info.current_delay_ms, 0);
    }

    #[test]
    fn test_reconnect_delays_then_give_up() {
        let (mut manager, _log, _built) = manager_with_log();
        manager.connect();
        manager.handle_push(&PushEvent::Connected);

        let mut delays = Vec::new();
        for _ in 0..5 {
            match manager.handle_push(&transport_drop()) {
                Some(ConnectionSignal::ScheduleReconnect(d)) => {
                    delays.push(d.as_millis() as u64)
                }
                other => panic!("expected ScheduleReconnect, got {other:?}"),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);

        // Attempt 6 is refused.
        let signal = manager.handle_push(&transport_drop());
        assert_eq!(signal, Some(ConnectionSignal::GaveUp));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_manual_reconnect_resets_budget() {
        let (mut manager, _log, _built) = manager_with_log();
        manager.connect();
        for _ in 0..6 {
            manager.handle_push(&transport_drop());
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.reconnect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.lock_info().reconnect_attempts, 0);
    }

    #[test]
    fn test_manual_disconnect_suppresses_reconnect() {
        let (mut manager, log, _built) = manager_with_log();
        manager.connect();
        manager.handle_push(&PushEvent::Connected);

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(log.closed.load(Ordering::SeqCst), 1);

        // A late transport disconnect from the dying channel must not
        // schedule anything.
        let signal = manager.handle_push(&transport_drop());
        assert_eq!(signal, None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_manual_close_reason_never_schedules() {
        let (mut manager, _log, _built) = manager_with_log();
        manager.connect();
        manager.handle_push(&PushEvent::Connected);

        let signal = manager.handle_push(&PushEvent::Disconnected {
            reason: DisconnectReason::Manual,
        });
        assert_eq!(signal, None);
    }

    #[test]
    fn test_each_connect_replaces_channel_instance() {
        let (mut manager, log, built) = manager_with_log();
        manager.connect();
        manager.handle_push(&transport_drop());
        // Timer fired: the loop calls connect() again.
        manager.connect();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(log.closed.load(Ordering::SeqCst), 1);
    }
}
