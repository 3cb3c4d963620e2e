//! Socket I/O task
//!
//! A [`Link`] moves the open transport onto its own task. The connection loop
//! hands it frames through a bounded channel and reads back whatever the
//! socket reports, so a socket that stops draining never holds the loop up.
//! Every write and close on the task is bounded by the configured write
//! timeout; expiry is reported as a [`TransportEvent::Error`].

use crate::transport::{Transport, TransportEvent};
use analysis_common::{ClientError, ClientResult};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Channel buffer size for outgoing frames
const MESSAGE_BUFFER_SIZE: usize = 100;

/// Close code sent when the client ends the connection itself
pub(crate) const CLIENT_CLOSE_CODE: u16 = 1000;

enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Loop-side handle to a transport running on its own task
pub(crate) struct Link {
    outgoing: mpsc::Sender<Outgoing>,
    events: mpsc::Receiver<TransportEvent>,
}

impl Link {
    pub(crate) fn spawn(transport: Box<dyn Transport>, write_timeout: Duration) -> Self {
        let (outgoing, requests) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let (reports, events) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        tokio::spawn(run(transport, requests, reports, write_timeout));
        Self { outgoing, events }
    }

    /// Hand a frame to the I/O task without waiting on the socket
    ///
    /// # Errors
    /// `Transport` when the buffer is full (the socket is not draining) or
    /// the task has stopped
    pub(crate) fn send_text(&self, text: String) -> ClientResult<()> {
        self.outgoing
            .try_send(Outgoing::Text(text))
            .map_err(|err| match err {
                TrySendError::Full(_) => ClientError::transport(format!(
                    "outgoing buffer full ({MESSAGE_BUFFER_SIZE} frames), socket is not draining"
                )),
                TrySendError::Closed(_) => ClientError::transport("socket task stopped"),
            })
    }

    /// Next report from the socket; `None` once the task has finished
    pub(crate) async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Ask the task to close the socket and return immediately
    ///
    /// When the buffer is full the request is dropped; the task then closes
    /// the socket on its own once it sees the channel is gone.
    pub(crate) fn close(self, code: u16, reason: &str) {
        let _ = self.outgoing.try_send(Outgoing::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

async fn run(
    mut transport: Box<dyn Transport>,
    mut requests: mpsc::Receiver<Outgoing>,
    reports: mpsc::Sender<TransportEvent>,
    write_timeout: Duration,
) {
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(Outgoing::Text(text)) => {
                    let failure = match tokio::time::timeout(write_timeout, transport.send_text(text)).await {
                        Ok(Ok(())) => None,
                        Ok(Err(ClientError::Transport(detail))) => Some(detail),
                        Ok(Err(err)) => Some(err.to_string()),
                        Err(_) => Some(format!("write timed out after {}ms", write_timeout.as_millis())),
                    };
                    if let Some(failure) = failure {
                        tracing::debug!(error = %failure, "Socket write failed");
                        let _ = reports.send(TransportEvent::Error(failure)).await;
                        break;
                    }
                }
                Some(Outgoing::Close { code, reason }) => {
                    close_within(transport.as_mut(), code, &reason, write_timeout).await;
                    break;
                }
                // The loop let go of the link without closing it
                None => {
                    close_within(transport.as_mut(), CLIENT_CLOSE_CODE, "client disconnect", write_timeout).await;
                    break;
                }
            },
            event = transport.next_event() => {
                let Some(event) = event else { break };
                let last = !matches!(event, TransportEvent::Text(_));
                if reports.send(event).await.is_err() || last {
                    break;
                }
            }
        }
    }
}

async fn close_within(transport: &mut dyn Transport, code: u16, reason: &str, limit: Duration) {
    if tokio::time::timeout(limit, transport.close(code, reason))
        .await
        .is_err()
    {
        tracing::debug!(
            code,
            timeout_ms = limit.as_millis() as u64,
            "Socket close timed out, dropping it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::pair;
    use serde_json::json;

    const LIMIT: Duration = Duration::from_secs(10);

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_written_in_order() {
        let (transport, mut server) = pair();
        let link = Link::spawn(Box::new(transport), LIMIT);

        link.send_text(json!({"type": "ping"}).to_string()).unwrap();
        link.send_text(json!({"type": "get_progress"}).to_string()).unwrap();
        settle().await;

        let sent = server.sent();
        assert_eq!(sent[0]["type"], "ping");
        assert_eq!(sent[1]["type"], "get_progress");
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_events_are_forwarded() {
        let (transport, server) = pair();
        let mut link = Link::spawn(Box::new(transport), LIMIT);

        server.push_text("hello");
        server.close(1001, "going away");

        assert_eq!(link.next_event().await, Some(TransportEvent::Text("hello".into())));
        assert_eq!(
            link.next_event().await,
            Some(TransportEvent::Closed {
                code: Some(1001),
                reason: "going away".into()
            })
        );
        // Nothing follows a close
        assert_eq!(link.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let (transport, server) = pair();
        let mut link = Link::spawn(Box::new(transport), LIMIT);
        server.stall_writes();

        link.send_text("{}".into()).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(11), link.next_event())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(TransportEvent::Error("write timed out after 10000ms".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_is_reported() {
        let (transport, server) = pair();
        let link = Link::spawn(Box::new(transport), LIMIT);
        server.stall_writes();

        // One frame is held by the stalled write, the rest fill the buffer
        for _ in 0..=MESSAGE_BUFFER_SIZE {
            link.send_text("{}".into()).unwrap();
            settle().await;
        }
        let err = link.send_text("{}".into()).unwrap_err();
        assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_and_drop_close_the_socket() {
        let (transport, server) = pair();
        let link = Link::spawn(Box::new(transport), LIMIT);
        link.close(CLIENT_CLOSE_CODE, "bye");
        settle().await;
        assert!(server.is_closed());

        let (transport, server) = pair();
        drop(Link::spawn(Box::new(transport), LIMIT));
        settle().await;
        assert!(server.is_closed());
    }
}
