//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub env: Environment,
    /// Base WebSocket endpoint, e.g. `wss://host/ws/analysis`
    pub endpoint: String,
    /// Authentication token appended as the `token` query parameter
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Longest a single socket write or close may take before the socket is
    /// treated as dead
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(()),
        }
    }
}

/// Heartbeat (ping/pong) configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub timeout_ms: u64,
}

impl HeartbeatConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// A heartbeat configuration that never pings
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_heartbeat_interval_ms(),
            timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

/// What the client does once exponential reconnection is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Retry the full connect sequence at a fixed interval
    #[default]
    Poll,
    /// Stay in the terminal error state until a manual reconnect
    Stop,
}

impl FromStr for FallbackMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "poll" | "polling" => Ok(Self::Poll),
            "stop" | "none" => Ok(Self::Stop),
            _ => Err(()),
        }
    }
}

/// Reconnection (backoff) configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter bound as a fraction of `base_delay_ms`
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub fallback: FallbackMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ReconnectConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_ratio: default_jitter_ratio(),
            max_attempts: default_max_attempts(),
            fallback: FallbackMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Behaviour of the outbound queue once it reaches capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room
    #[default]
    DropOldest,
    /// Refuse the new message
    RejectNew,
}

impl FromStr for OverflowPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "drop_oldest" => Ok(Self::DropOldest),
            "reject_new" => Ok(Self::RejectNew),
            _ => Err(()),
        }
    }
}

/// Outbound queue configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Maximum queued messages; 0 means unbounded
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            capacity: 0,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_queue_capacity() -> usize {
    256
}

impl ClientConfig {
    /// Create a configuration for `endpoint` with every other value at its default
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            env: Environment::default(),
            endpoint: endpoint.into(),
            token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            queue: QueueConfig::default(),
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `ANALYSIS_WS_URL` is missing or a value fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            env: lookup("APP_ENV")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            endpoint: lookup("ANALYSIS_WS_URL").ok_or(ConfigError::MissingVar("ANALYSIS_WS_URL"))?,
            token: lookup("ANALYSIS_WS_TOKEN").filter(|t| !t.trim().is_empty()),
            connect_timeout_ms: parse_var(
                &lookup,
                "ANALYSIS_CONNECT_TIMEOUT_MS",
                default_connect_timeout_ms(),
            )?,
            write_timeout_ms: parse_var(
                &lookup,
                "ANALYSIS_WRITE_TIMEOUT_MS",
                default_write_timeout_ms(),
            )?,
            heartbeat: HeartbeatConfig {
                enabled: parse_var(&lookup, "ANALYSIS_HEARTBEAT_ENABLED", true)?,
                interval_ms: parse_var(
                    &lookup,
                    "ANALYSIS_HEARTBEAT_INTERVAL_MS",
                    default_heartbeat_interval_ms(),
                )?,
                timeout_ms: parse_var(
                    &lookup,
                    "ANALYSIS_HEARTBEAT_TIMEOUT_MS",
                    default_heartbeat_timeout_ms(),
                )?,
            },
            reconnect: ReconnectConfig {
                base_delay_ms: parse_var(
                    &lookup,
                    "ANALYSIS_RECONNECT_BASE_DELAY_MS",
                    default_base_delay_ms(),
                )?,
                max_delay_ms: parse_var(
                    &lookup,
                    "ANALYSIS_RECONNECT_MAX_DELAY_MS",
                    default_max_delay_ms(),
                )?,
                multiplier: parse_var(&lookup, "ANALYSIS_RECONNECT_MULTIPLIER", default_multiplier())?,
                jitter_ratio: parse_var(
                    &lookup,
                    "ANALYSIS_RECONNECT_JITTER_RATIO",
                    default_jitter_ratio(),
                )?,
                max_attempts: parse_var(
                    &lookup,
                    "ANALYSIS_RECONNECT_MAX_ATTEMPTS",
                    default_max_attempts(),
                )?,
                fallback: parse_var(&lookup, "ANALYSIS_RECONNECT_FALLBACK", FallbackMode::default())?,
                poll_interval_ms: parse_var(
                    &lookup,
                    "ANALYSIS_POLL_INTERVAL_MS",
                    default_poll_interval_ms(),
                )?,
            },
            queue: QueueConfig {
                capacity: parse_var(&lookup, "ANALYSIS_QUEUE_CAPACITY", default_queue_capacity())?,
                overflow: parse_var(&lookup, "ANALYSIS_QUEUE_OVERFLOW", OverflowPolicy::default())?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidValue("ANALYSIS_WS_URL", e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_WS_URL",
                format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_CONNECT_TIMEOUT_MS",
                "must be greater than zero".to_string(),
            ));
        }

        if self.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_WRITE_TIMEOUT_MS",
                "must be greater than zero".to_string(),
            ));
        }

        if self.heartbeat.enabled && self.heartbeat.timeout_ms >= self.heartbeat.interval_ms {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_HEARTBEAT_TIMEOUT_MS",
                format!(
                    "timeout {}ms must be shorter than interval {}ms",
                    self.heartbeat.timeout_ms, self.heartbeat.interval_ms
                ),
            ));
        }

        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms > reconnect.max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_RECONNECT_BASE_DELAY_MS",
                format!(
                    "base delay {}ms exceeds max delay {}ms",
                    reconnect.base_delay_ms, reconnect.max_delay_ms
                ),
            ));
        }
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_RECONNECT_MULTIPLIER",
                format!("{} is not >= 1.0", reconnect.multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_ratio) {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_RECONNECT_JITTER_RATIO",
                format!("{} is outside [0, 1]", reconnect.jitter_ratio),
            ));
        }
        if reconnect.fallback == FallbackMode::Poll && reconnect.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_POLL_INTERVAL_MS",
                "must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        _ => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
