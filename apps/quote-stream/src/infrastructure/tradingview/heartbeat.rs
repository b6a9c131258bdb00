//! Heartbeat Manager
//!
//! Transport-level liveness for the quote socket. A timer asks the
//! connection loop to send WebSocket pings; if a ping goes unanswered for
//! longer than the timeout, the loop is told to drop the connection.
//!
//! This is independent of the protocol's own `~h~` keep-alives, which the
//! server originates and the client merely echoes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::ConnectionSettings;

/// Shortest period either timer will run at.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Time allowed for a pong before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from [`ConnectionSettings`].
    #[must_use]
    pub const fn from_connection_settings(settings: &ConnectionSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval,
            pong_timeout: settings.ping_timeout,
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping now.
    SendPing,
    /// A ping went unanswered; the connection should be dropped.
    Timeout,
}

/// Ping/pong bookkeeping shared with the connection loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_ping: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_ping: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record that a pong was received.
    pub fn record_pong(&self) {
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Record that a ping was sent. An outstanding ping keeps its original
    /// send time.
    pub fn mark_ping_sent(&self) {
        if !self.waiting_for_pong.swap(true, Ordering::SeqCst) {
            *self.last_ping.write() = Instant::now();
        }
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Time since the outstanding ping was sent.
    #[must_use]
    pub fn time_since_ping(&self) -> Duration {
        self.last_ping.read().elapsed()
    }
}

/// Timer task driving [`HeartbeatEvent`]s for one connection.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the receiver is dropped, or a timeout fires.
    pub async fn run(self) {
        let ping_interval = self.config.ping_interval.max(MIN_PERIOD);
        let start = tokio::time::Instant::now() + ping_interval;
        let mut interval = tokio::time::interval_at(start, ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut check = tokio::time::interval(self.check_period());
        check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = check.tick() => {
                    if self.timed_out().await {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
                        tracing::debug!("Event channel closed, stopping heartbeat");
                        break;
                    }
                }
            }
        }
    }

    /// Emit `Timeout` if the outstanding ping has expired.
    async fn timed_out(&self) -> bool {
        if !self.state.is_waiting_for_pong() {
            return false;
        }

        let elapsed = self.state.time_since_ping();
        if elapsed <= self.config.pong_timeout {
            return false;
        }

        tracing::warn!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            timeout_secs = self.config.pong_timeout.as_secs(),
            "Heartbeat timeout detected"
        );
        let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
        true
    }

    fn check_period(&self) -> Duration {
        (self.config.pong_timeout / 4).max(MIN_PERIOD)
    }
}
