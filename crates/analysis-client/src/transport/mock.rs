//! Scripted in-memory transport for controller tests

use super::{Connector, Transport, TransportEvent};
use analysis_common::{ClientError, ClientResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// How the next `connect` call behaves
pub(crate) enum Script {
    Accept(MockTransport),
    Fail(ClientError),
    /// Never completes; exercises the connect timeout
    Hang,
}

/// Connector that replays a script; an empty script refuses connections
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    script: Arc<Mutex<VecDeque<Script>>>,
    attempts: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<Url>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, step: Script) {
        self.script.lock().push_back(step);
    }

    /// Queue an accepted connection and return the server side of it
    pub(crate) fn accept(&self) -> MockServer {
        let (transport, server) = pair();
        self.push(Script::Accept(transport));
        server
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<Url> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> ClientResult<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.clone());

        let step = self.script.lock().pop_front();
        match step {
            Some(Script::Accept(transport)) => Ok(Box::new(transport)),
            Some(Script::Fail(err)) => Err(err),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(ClientError::transport("connection refused")),
        }
    }
}

pub(crate) struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::transport("socket closed"));
        }
        self.outbound
            .send(text)
            .map_err(|_| ClientError::transport("peer gone"))
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    async fn close(&mut self, _code: u16, _reason: &str) {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Test side of a [`MockTransport`]
pub(crate) struct MockServer {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl MockServer {
    pub(crate) fn push_json(&self, frame: &Value) {
        let _ = self.inbound.send(TransportEvent::Text(frame.to_string()));
    }

    pub(crate) fn push_text(&self, frame: &str) {
        let _ = self.inbound.send(TransportEvent::Text(frame.to_string()));
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Frames the client wrote so far, parsed as JSON
    pub(crate) fn sent(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            if let Ok(value) = serde_json::from_str(&text) {
                frames.push(value);
            }
        }
        frames
    }

    /// Stop draining: every later write and close on the client side hangs
    pub(crate) fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Whether the client closed its side
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) fn pair() -> (MockTransport, MockServer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let stalled = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            inbound: inbound_rx,
            outbound: outbound_tx,
            closed: Arc::clone(&closed),
            stalled: Arc::clone(&stalled),
        },
        MockServer {
            inbound: inbound_tx,
            outbound: outbound_rx,
            closed,
            stalled,
        },
    )
}
