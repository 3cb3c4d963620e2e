//! tokio-tungstenite transport

use super::{Connector, Transport, TransportEvent};
use analysis_common::{ClientError, ClientResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections (`ws://` and `wss://`)
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> ClientResult<Box<dyn Transport>> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(handshake_error)?;

        tracing::debug!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            status = response.status().as_u16(),
            "WebSocket handshake complete"
        );

        Ok(Box::new(WsTransport { stream }))
    }
}

/// HTTP 401/403 during the upgrade means the token was refused
fn handshake_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            let reason = format!("handshake rejected with HTTP {status}");
            if matches!(status, 401 | 403) {
                ClientError::auth(status, reason)
            } else {
                ClientError::transport(reason)
            }
        }
        other => ClientError::transport(other),
    }
}

struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(ClientError::transport)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(TransportEvent::Text(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(TransportEvent::Text(text)),
                    Err(_) => tracing::warn!("Ignoring non UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Some(TransportEvent::Closed { code, reason });
                }
                // tungstenite answers protocol pings itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            tracing::trace!(error = %e, "Close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_retryable() {
        let err = handshake_error(tungstenite::Error::ConnectionClosed);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        // Port 9 (discard) is essentially never listening on loopback
        let url = Url::parse("ws://127.0.0.1:9/ws/analysis/a1").unwrap();
        let err = WsConnector.connect(&url).await.err().unwrap();
        assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    }
}
