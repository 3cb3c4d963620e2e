//! Exponential backoff with jitter
//!
//! `delay(attempt) = min(base * multiplier^attempt + jitter, max)` where the
//! jitter is a random fraction of `jitter_ratio * base`.

use analysis_common::{FallbackMode, ReconnectConfig};
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Computes reconnect delays and decides when to give up
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_attempts
    }

    /// Delay before reconnect `attempt` (zero based), with random jitter
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter_unit: f64 = rand::thread_rng().gen();
        self.delay_with_jitter(attempt, jitter_unit)
    }

    /// Deterministic form of [`next_delay`](Self::next_delay); `jitter_unit` is clamped to [0, 1]
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let base = self.config.base_delay_ms as f64;
        let max = self.config.max_delay_ms as f64;

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = base * self.config.multiplier.powi(exponent);
        let jitter = jitter_unit.clamp(0.0, 1.0) * self.config.jitter_ratio.max(0.0) * base;

        let delay = (scaled + jitter).min(max);
        if delay.is_nan() {
            return Duration::from_millis(self.config.max_delay_ms);
        }
        Duration::from_millis(delay as u64)
    }

    /// What to do once `should_retry` turns false
    #[must_use]
    pub fn fallback(&self) -> FallbackMode {
        self.config.fallback
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }
}

/// Progress of the current reconnection sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempt_count: u32,
    pub last_attempt_at: Option<Instant>,
    pub next_delay: Option<Duration>,
}

impl ReconnectState {
    /// Record that attempt number `attempt_count` has been scheduled
    pub fn record_attempt(&mut self, delay: Duration, now: Instant) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_attempt_at = Some(now);
        self.next_delay = Some(delay);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
