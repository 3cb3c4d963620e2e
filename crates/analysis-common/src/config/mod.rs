//! Configuration structs

mod client_config;

pub use client_config::{
    ClientConfig, ConfigError, Environment, FallbackMode, HeartbeatConfig, OverflowPolicy,
    QueueConfig, ReconnectConfig,
};
