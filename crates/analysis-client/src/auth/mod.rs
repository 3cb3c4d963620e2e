//! Credentials for the WebSocket handshake

mod token;

pub use token::{SharedToken, StaticToken, TokenProvider};
