//! # analysis-common
//!
//! Shared utilities for the analysis stream client: configuration, the error
//! taxonomy, and telemetry.

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    ClientConfig, ConfigError, Environment, FallbackMode, HeartbeatConfig, OverflowPolicy,
    QueueConfig, ReconnectConfig,
};
pub use error::{ClientError, ClientResult};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
