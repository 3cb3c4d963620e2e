//! Transport seam
//!
//! The connection loop talks to the socket only through [`Connector`] and
//! [`Transport`], so tests can script connections without a network.

mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use websocket::WsConnector;

use analysis_common::ClientResult;
use async_trait::async_trait;
use url::Url;

/// Something that happened on an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame
    Text(String),
    /// The peer closed the connection; `code` is `None` without a close frame
    Closed { code: Option<u16>, reason: String },
    /// Read failure; the transport is unusable afterwards
    Error(String),
}

/// An open, bidirectional text transport
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> ClientResult<()>;

    /// Wait for the next event; `None` once the stream has ended
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses nothing.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close with a status code; errors are ignored
    async fn close(&mut self, code: u16, reason: &str);
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> ClientResult<Box<dyn Transport>>;
}
