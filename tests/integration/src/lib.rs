//! Integration test utilities for the analysis stream client
//!
//! This crate runs the real WebSocket transport against an in-process axum
//! server that speaks the analysis stream protocol.

pub mod helpers;

pub use helpers::*;
