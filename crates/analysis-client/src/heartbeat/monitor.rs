//! Heartbeat monitor
//!
//! Deadline-driven: the monitor owns no timers. The connection loop sleeps
//! until [`HeartbeatMonitor::next_deadline`] and then calls
//! [`HeartbeatMonitor::poll`], so stopping the monitor is just forgetting
//! its deadlines.

use analysis_common::HeartbeatConfig;
use std::time::Duration;
use tokio::time::Instant;

/// What the connection loop has to do after polling the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Nothing is due yet
    Idle,
    /// Send a ping now; the pong deadline has been armed
    SendPing,
    /// The pong deadline passed; the monitor has stopped itself
    TimedOut,
}

/// Tracks the next ping and the pending pong deadline
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    next_ping: Option<Instant>,
    pong_deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            next_ping: None,
            pong_deadline: None,
        }
    }

    /// Arm the next ping at `now + interval`
    ///
    /// Calling `start` while running re-arms instead of adding a second
    /// schedule. Does nothing when the heartbeat is disabled.
    pub fn start(&mut self, now: Instant) {
        if !self.config.enabled {
            return;
        }
        self.pong_deadline = None;
        self.next_ping = Some(now + self.config.interval());
    }

    /// Forget all deadlines
    pub fn stop(&mut self) {
        self.next_ping = None;
        self.pong_deadline = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.next_ping.is_some() || self.pong_deadline.is_some()
    }

    #[must_use]
    pub fn is_awaiting_pong(&self) -> bool {
        self.pong_deadline.is_some()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// The earliest instant at which `poll` can return something other than `Idle`
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pong_deadline.or(self.next_ping)
    }

    pub fn poll(&mut self, now: Instant) -> HeartbeatTick {
        if let Some(deadline) = self.pong_deadline {
            if now >= deadline {
                self.stop();
                return HeartbeatTick::TimedOut;
            }
            return HeartbeatTick::Idle;
        }

        match self.next_ping {
            Some(at) if now >= at => {
                self.next_ping = None;
                self.pong_deadline = Some(now + self.config.timeout());
                HeartbeatTick::SendPing
            }
            _ => HeartbeatTick::Idle,
        }
    }

    /// Record a pong; returns false if none was expected
    pub fn on_pong(&mut self, now: Instant) -> bool {
        if self.pong_deadline.take().is_none() {
            return false;
        }
        self.next_ping = Some(now + self.config.interval());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            enabled: true,
            interval_ms: 30_000,
            timeout_ms: 5_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_arms_one_ping() {
        let mut monitor = HeartbeatMonitor::new(config());
        let now = Instant::now();

        monitor.start(now);
        monitor.start(now);

        assert!(monitor.is_running());
        assert_eq!(monitor.next_deadline(), Some(now + Duration::from_secs(30)));
        assert_eq!(monitor.poll(now + Duration::from_secs(29)), HeartbeatTick::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_then_pong_reschedules() {
        let mut monitor = HeartbeatMonitor::new(config());
        let start = Instant::now();
        monitor.start(start);

        let ping_at = start + Duration::from_secs(30);
        assert_eq!(monitor.poll(ping_at), HeartbeatTick::SendPing);
        assert!(monitor.is_awaiting_pong());
        assert_eq!(monitor.next_deadline(), Some(ping_at + Duration::from_secs(5)));

        let pong_at = ping_at + Duration::from_secs(1);
        assert!(monitor.on_pong(pong_at));
        assert!(!monitor.is_awaiting_pong());
        assert_eq!(monitor.next_deadline(), Some(pong_at + Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_pong_times_out_once() {
        let mut monitor = HeartbeatMonitor::new(config());
        let start = Instant::now();
        monitor.start(start);

        let ping_at = start + Duration::from_secs(30);
        assert_eq!(monitor.poll(ping_at), HeartbeatTick::SendPing);

        let late = ping_at + Duration::from_secs(5);
        assert_eq!(monitor.poll(late), HeartbeatTick::TimedOut);
        assert!(!monitor.is_running());
        assert_eq!(monitor.poll(late + Duration::from_secs(60)), HeartbeatTick::Idle);
        assert_eq!(monitor.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_pong_is_ignored() {
        let mut monitor = HeartbeatMonitor::new(config());
        let now = Instant::now();
        monitor.start(now);

        assert!(!monitor.on_pong(now));
        assert_eq!(monitor.next_deadline(), Some(now + Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_deadlines() {
        let mut monitor = HeartbeatMonitor::new(config());
        let now = Instant::now();
        monitor.start(now);
        monitor.poll(now + Duration::from_secs(30));

        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(monitor.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_arms() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::disabled());
        monitor.start(Instant::now());
        assert!(!monitor.is_running());
        assert_eq!(monitor.next_deadline(), None);
    }
}
