//! Connection controller
//!
//! Cheap cloneable handle over the connection event loop. All clones drive
//! the same connection; the loop stops when the last handle is dropped or
//! [`ConnectionController::shutdown`] is called.

use super::event_loop::{Command, EventLoop, LoopContext};
use super::queue::SendOutcome;
use super::state::{ConnectionState, ConnectionStats, SharedState};
use crate::auth::{StaticToken, TokenProvider};
use crate::dispatch::EventDispatcher;
use crate::transport::{Connector, WsConnector};
use analysis_common::{ClientConfig, ClientError, ClientResult};
use analysis_protocol::OutboundMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Buffer size for the command channel
const COMMAND_BUFFER_SIZE: usize = 100;

#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<Inner>,
}

struct Inner {
    commands: mpsc::Sender<Command>,
    shared: Arc<SharedState>,
    dispatcher: Arc<EventDispatcher>,
    analysis_id: String,
}

impl ConnectionController {
    /// Create a controller and spawn its event loop on the current runtime
    ///
    /// Nothing connects until [`connect`](Self::connect) is called.
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the configuration or analysis id is invalid
    pub fn new(
        config: ClientConfig,
        analysis_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenProvider>,
    ) -> ClientResult<Self> {
        let analysis_id = analysis_id.into();
        if analysis_id.trim().is_empty() {
            return Err(ClientError::Config("analysis id must not be empty".to_string()));
        }
        config.validate()?;

        let shared = Arc::new(SharedState::default());
        let dispatcher = EventDispatcher::new_shared();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER_SIZE);

        let event_loop = EventLoop::new(
            LoopContext {
                config,
                analysis_id: analysis_id.clone(),
                connector,
                tokens,
                dispatcher: Arc::clone(&dispatcher),
                shared: Arc::clone(&shared),
            },
            rx,
        );
        tokio::spawn(event_loop.run());

        tracing::debug!(analysis_id = %analysis_id, "Connection controller created");

        Ok(Self {
            inner: Arc::new(Inner {
                commands: tx,
                shared,
                dispatcher,
                analysis_id,
            }),
        })
    }

    /// Controller over real WebSocket connections using the configured token
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the configuration or analysis id is invalid
    pub fn with_websocket(config: ClientConfig, analysis_id: impl Into<String>) -> ClientResult<Self> {
        let tokens = Arc::new(StaticToken::from(config.token.clone()));
        Self::new(config, analysis_id, Arc::new(WsConnector), tokens)
    }

    /// Open the connection and wait until it is established
    ///
    /// Resolves immediately when already connected and joins the pending
    /// attempt when one is in flight. Transient failures are retried in the
    /// background; the returned future resolves once the connection opens, or
    /// fails on an authentication error, on exhaustion, or when
    /// [`disconnect`](Self::disconnect) is called first.
    ///
    /// # Errors
    /// `Auth`, `Config`, `ReconnectExhausted` or `Closed`
    pub async fn connect(&self) -> ClientResult<()> {
        self.request(Command::Connect).await?
    }

    /// Close the connection and cancel every pending timer
    ///
    /// No automatic reconnection happens afterwards. Queued messages are kept
    /// and flushed by the next successful `connect`.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Disconnect(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Drop the current connection and start over with a fresh attempt budget
    ///
    /// # Errors
    /// Same as [`connect`](Self::connect)
    pub async fn reconnect(&self) -> ClientResult<()> {
        self.request(Command::Reconnect).await?
    }

    /// Send now if connected, otherwise queue for the next connection
    ///
    /// # Errors
    /// `QueueFull` under the reject-new overflow policy, `Closed` after shutdown
    pub async fn send(&self, message: OutboundMessage) -> ClientResult<SendOutcome> {
        self.request(|reply| Command::Send(message, reply)).await?
    }

    /// Ask the server for updates on `analysis_id`
    ///
    /// The subscription is remembered and replayed after every reconnect.
    ///
    /// # Errors
    /// `Closed` after shutdown
    pub async fn subscribe_analysis(&self, analysis_id: impl Into<String>) -> ClientResult<()> {
        let analysis_id = analysis_id.into();
        self.request(|reply| Command::Subscribe(analysis_id, reply)).await?
    }

    /// # Errors
    /// `Closed` after shutdown
    pub async fn unsubscribe_analysis(&self, analysis_id: impl Into<String>) -> ClientResult<()> {
        let analysis_id = analysis_id.into();
        self.request(|reply| Command::Unsubscribe(analysis_id, reply)).await?
    }

    /// Stop the event loop; every later request fails with `Closed`
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.inner.shared.snapshot()
    }

    /// Register listeners here
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn analysis_id(&self) -> &str {
        &self.inner.analysis_id
    }

    async fn request<T, F>(&self, build: F) -> ClientResult<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(build(tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("analysis_id", &self.inner.analysis_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
