//! Connection event loop
//!
//! A single task owns the outbound queue, the heartbeat monitor and the
//! reconnect state. Handles talk to it over a command channel. The socket
//! itself runs on a separate I/O task behind a [`Link`], so no branch of the
//! loop ever waits on the network. Every timer is an optional deadline re-evaluated on each turn of
//! the loop, so cancelling a timer is clearing its deadline; nothing can fire
//! after `disconnect` because nothing is left armed.

use super::endpoint::{build_url, redacted};
use super::link::{Link, CLIENT_CLOSE_CODE};
use super::queue::{OutboundQueue, SendOutcome};
use super::state::{ConnectionState, SharedState};
use crate::auth::TokenProvider;
use crate::dispatch::EventDispatcher;
use crate::heartbeat::{HeartbeatMonitor, HeartbeatTick};
use crate::reconnect::{ReconnectPolicy, ReconnectState};
use crate::transport::{Connector, Transport, TransportEvent};
use analysis_common::{ClientConfig, ClientError, ClientResult, FallbackMode};
use analysis_protocol::{CloseCode, MessageCodec, OutboundMessage};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

type ConnectFuture = Pin<Box<dyn Future<Output = ClientResult<Box<dyn Transport>>> + Send>>;

/// Requests from [`ConnectionController`](super::ConnectionController) handles
pub(crate) enum Command {
    Connect(oneshot::Sender<ClientResult<()>>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<ClientResult<()>>),
    Send(OutboundMessage, oneshot::Sender<ClientResult<SendOutcome>>),
    Subscribe(String, oneshot::Sender<ClientResult<()>>),
    Unsubscribe(String, oneshot::Sender<ClientResult<()>>),
    Shutdown(oneshot::Sender<()>),
}

/// Everything the loop needs at spawn time
pub(crate) struct LoopContext {
    pub(crate) config: ClientConfig,
    pub(crate) analysis_id: String,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) shared: Arc<SharedState>,
}

pub(crate) struct EventLoop {
    config: ClientConfig,
    analysis_id: String,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenProvider>,
    dispatcher: Arc<EventDispatcher>,
    shared: Arc<SharedState>,
    commands: mpsc::Receiver<Command>,

    state: ConnectionState,
    link: Option<Link>,
    connecting: Option<ConnectFuture>,
    heartbeat: HeartbeatMonitor,
    policy: ReconnectPolicy,
    reconnect: ReconnectState,
    reconnect_at: Option<Instant>,
    poll_at: Option<Instant>,
    /// Exponential retries are exhausted; attempts come from the poll timer
    polling: bool,
    /// Set by `disconnect`; cleared by the next `connect`
    manual: bool,
    queue: OutboundQueue,
    subscriptions: BTreeSet<String>,
    waiters: Vec<oneshot::Sender<ClientResult<()>>>,
}

enum Flow {
    Continue,
    Stop,
}

impl EventLoop {
    pub(crate) fn new(ctx: LoopContext, commands: mpsc::Receiver<Command>) -> Self {
        let heartbeat = HeartbeatMonitor::new(ctx.config.heartbeat.clone());
        let policy = ReconnectPolicy::new(ctx.config.reconnect.clone());
        let queue = OutboundQueue::new(ctx.config.queue);

        Self {
            config: ctx.config,
            analysis_id: ctx.analysis_id,
            connector: ctx.connector,
            tokens: ctx.tokens,
            dispatcher: ctx.dispatcher,
            shared: ctx.shared,
            commands,
            state: ConnectionState::Disconnected,
            link: None,
            connecting: None,
            heartbeat,
            policy,
            reconnect: ReconnectState::default(),
            reconnect_at: None,
            poll_at: None,
            polling: false,
            manual: false,
            queue,
            subscriptions: BTreeSet::new(),
            waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(analysis_id = %self.analysis_id, "Connection loop started");

        loop {
            let heartbeat_at = self.heartbeat.next_deadline();
            let reconnect_at = self.reconnect_at;
            let poll_at = self.poll_at;

            tokio::select! {
                command = self.commands.recv() => {
                    let flow = match command {
                        Some(command) => self.handle_command(command),
                        // Every handle is gone
                        None => Flow::Stop,
                    };
                    if matches!(flow, Flow::Stop) {
                        break;
                    }
                }
                result = poll_connect(&mut self.connecting) => {
                    self.on_connect_result(result);
                }
                event = next_event(&mut self.link) => {
                    self.on_transport_event(event);
                }
                () = sleep_until(heartbeat_at) => {
                    self.on_heartbeat_deadline();
                }
                () = sleep_until(reconnect_at) => {
                    self.reconnect_at = None;
                    self.on_reconnect_timer();
                }
                () = sleep_until(poll_at) => {
                    self.poll_at = None;
                    self.on_poll_timer();
                }
            }
        }

        self.teardown();
        tracing::debug!(analysis_id = %self.analysis_id, "Connection loop stopped");
    }

    // === Commands ===

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Connect(reply) => self.on_connect_requested(reply),
            Command::Disconnect(reply) => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Reconnect(reply) => {
                self.reset_connection();
                self.set_state(ConnectionState::Disconnected);
                self.manual = false;
                self.waiters.push(reply);
                self.begin_connect();
            }
            Command::Send(message, reply) => {
                let outcome = self.send_or_queue(message);
                let _ = reply.send(outcome);
            }
            Command::Subscribe(analysis_id, reply) => {
                let message = OutboundMessage::subscribe_analysis(analysis_id.clone());
                if self.subscriptions.insert(analysis_id) && self.state.is_connected() {
                    self.write_or_recover(&message);
                }
                let _ = reply.send(Ok(()));
            }
            Command::Unsubscribe(analysis_id, reply) => {
                let message = OutboundMessage::unsubscribe_analysis(analysis_id.clone());
                if self.subscriptions.remove(&analysis_id) && self.state.is_connected() {
                    self.write_or_recover(&message);
                }
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown(reply) => {
                self.teardown();
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn on_connect_requested(&mut self, reply: oneshot::Sender<ClientResult<()>>) {
        match self.state {
            ConnectionState::Connected => {
                let _ = reply.send(Ok(()));
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.waiters.push(reply);
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.manual = false;
                self.polling = false;
                self.poll_at = None;
                self.reconnect.reset();
                self.shared.set_reconnect_attempts(0);
                self.waiters.push(reply);
                self.begin_connect();
            }
        }
    }

    fn disconnect(&mut self) {
        self.manual = true;
        self.reset_connection();
        self.resolve_waiters(&Err(ClientError::Closed));
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(analysis_id = %self.analysis_id, "Disconnected by client");
    }

    /// Cancel every deadline, abandon any pending attempt and close the socket
    fn reset_connection(&mut self) {
        self.connecting = None;
        self.reconnect_at = None;
        self.poll_at = None;
        self.polling = false;
        self.heartbeat.stop();
        self.reconnect.reset();
        self.shared.set_reconnect_attempts(0);

        if let Some(link) = self.link.take() {
            link.close(CLIENT_CLOSE_CODE, "client disconnect");
        }
    }

    fn teardown(&mut self) {
        self.manual = true;
        self.reset_connection();
        self.resolve_waiters(&Err(ClientError::Closed));
        self.set_state(ConnectionState::Disconnected);
    }

    // === Connecting ===

    fn begin_connect(&mut self) {
        let token = self.tokens.token();
        let url = match build_url(&self.config.endpoint, &self.analysis_id, token.as_deref()) {
            Ok(url) => url,
            Err(err) => {
                self.set_state(ConnectionState::Error);
                self.fail_terminal(err);
                return;
            }
        };

        self.set_state(ConnectionState::Connecting);
        tracing::debug!(
            analysis_id = %self.analysis_id,
            url = %redacted(&url),
            attempt = self.reconnect.attempt_count,
            "Opening connection"
        );

        let connector = Arc::clone(&self.connector);
        let timeout = self.config.connect_timeout();
        let timeout_ms = self.config.connect_timeout_ms;
        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::ConnectTimeout { timeout_ms }),
            }
        }));
    }

    fn on_connect_result(&mut self, result: ClientResult<Box<dyn Transport>>) {
        match result {
            Ok(transport) => self.on_open(transport),
            Err(err) => self.on_connect_failed(err),
        }
    }

    fn on_open(&mut self, transport: Box<dyn Transport>) {
        self.link = Some(Link::spawn(transport, self.config.write_timeout()));
        self.polling = false;
        self.poll_at = None;
        self.reconnect_at = None;
        self.reconnect.reset();
        self.shared.set_reconnect_attempts(0);
        self.shared.record_connected();

        self.set_state(ConnectionState::Connected);
        self.heartbeat.start(Instant::now());
        self.resolve_waiters(&Ok(()));

        // Subscriptions first, then whatever was queued while offline
        let replay: Vec<OutboundMessage> = self
            .subscriptions
            .iter()
            .map(|id| OutboundMessage::subscribe_analysis(id.clone()))
            .collect();
        for message in &replay {
            if !self.write_or_recover(message) {
                return;
            }
        }
        self.flush_queue();
    }

    fn on_connect_failed(&mut self, err: ClientError) {
        tracing::warn!(
            analysis_id = %self.analysis_id,
            error = %err,
            attempt = self.reconnect.attempt_count,
            "Connection attempt failed"
        );
        self.set_state(ConnectionState::Error);

        if !err.is_retryable() {
            self.fail_terminal(err);
            return;
        }

        self.dispatcher.notify_error(&err);
        if self.polling {
            self.arm_poll();
        } else {
            self.schedule_reconnect();
        }
    }

    // === Recovery ===

    /// Arm the next exponential retry, or hand over to the fallback
    fn schedule_reconnect(&mut self) {
        self.set_state(ConnectionState::Reconnecting);

        let attempt = self.reconnect.attempt_count;
        if !self.policy.should_retry(attempt) {
            self.exhausted();
            return;
        }

        let now = Instant::now();
        let delay = self.policy.next_delay(attempt);
        self.reconnect.record_attempt(delay, now);
        self.shared.set_reconnect_attempts(self.reconnect.attempt_count);
        self.reconnect_at = Some(now + delay);

        tracing::info!(
            analysis_id = %self.analysis_id,
            attempt = self.reconnect.attempt_count,
            max_attempts = self.policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    fn exhausted(&mut self) {
        let err = ClientError::ReconnectExhausted {
            attempts: self.reconnect.attempt_count,
        };
        tracing::error!(analysis_id = %self.analysis_id, error = %err, "Giving up on reconnection");

        self.set_state(ConnectionState::Error);
        self.dispatcher.notify_error(&err);
        self.resolve_waiters(&Err(err));

        if self.policy.fallback() == FallbackMode::Poll {
            self.polling = true;
            self.arm_poll();
        }
    }

    fn arm_poll(&mut self) {
        let interval = self.policy.poll_interval();
        self.poll_at = Some(Instant::now() + interval);
        tracing::debug!(
            analysis_id = %self.analysis_id,
            interval_ms = interval.as_millis() as u64,
            "Polling fallback armed"
        );
    }

    fn on_reconnect_timer(&mut self) {
        if self.manual || self.state != ConnectionState::Reconnecting {
            return;
        }
        self.begin_connect();
    }

    fn on_poll_timer(&mut self) {
        if self.manual || !self.polling {
            return;
        }
        self.begin_connect();
    }

    /// Auth failures and bad configuration: stop and stay in `Error`
    fn fail_terminal(&mut self, err: ClientError) {
        tracing::error!(analysis_id = %self.analysis_id, error = %err, "Connection failed permanently");
        self.connecting = None;
        self.reconnect_at = None;
        self.poll_at = None;
        self.polling = false;
        self.heartbeat.stop();
        self.dispatcher.notify_error(&err);
        self.resolve_waiters(&Err(err));
    }

    /// The open connection died without being asked to
    fn on_connection_lost(&mut self, err: ClientError) {
        self.link = None;
        self.heartbeat.stop();
        if self.manual {
            return;
        }

        tracing::warn!(analysis_id = %self.analysis_id, error = %err, "Connection lost");
        self.dispatcher.notify_error(&err);
        self.schedule_reconnect();
    }

    // === Transport traffic ===

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Text(text)) => self.on_frame(&text),
            Some(TransportEvent::Closed { code, reason }) => self.on_closed(code, reason),
            Some(TransportEvent::Error(message)) => {
                self.on_connection_lost(ClientError::Transport(message));
            }
            None => self.on_closed(None, String::new()),
        }
    }

    fn on_frame(&mut self, text: &str) {
        self.shared.record_received();

        match MessageCodec::decode(text) {
            Ok(event) => {
                tracing::trace!(event_type = %event.kind(), "Frame received");
                if event.is_pong() {
                    self.heartbeat.on_pong(Instant::now());
                }
                self.dispatcher.dispatch(&event);
            }
            Err(err) => {
                self.shared.record_rejected();
                tracing::warn!(
                    analysis_id = %self.analysis_id,
                    event_type = err.event_type().unwrap_or("-"),
                    error = %err,
                    "Dropping frame"
                );
            }
        }
    }

    fn on_closed(&mut self, code: Option<u16>, reason: String) {
        tracing::info!(
            analysis_id = %self.analysis_id,
            code = code.unwrap_or_default(),
            reason = %reason,
            "Connection closed by server"
        );

        match code.and_then(CloseCode::from_u16) {
            Some(close) if close.is_auth_failure() => {
                self.link = None;
                self.set_state(ConnectionState::Error);
                let reason = if reason.is_empty() {
                    close.description().to_string()
                } else {
                    reason
                };
                self.fail_terminal(ClientError::auth(close.as_u16(), reason));
            }
            _ => {
                let detail = match code {
                    Some(code) => format!("closed with code {code}"),
                    None => "connection closed without a close frame".to_string(),
                };
                self.on_connection_lost(ClientError::Transport(detail));
            }
        }
    }

    fn on_heartbeat_deadline(&mut self) {
        match self.heartbeat.poll(Instant::now()) {
            HeartbeatTick::Idle => {}
            HeartbeatTick::SendPing => {
                tracing::trace!(analysis_id = %self.analysis_id, "Sending heartbeat ping");
                self.write_or_recover(&OutboundMessage::ping());
            }
            HeartbeatTick::TimedOut => {
                let timeout_ms = self.heartbeat.timeout().as_millis() as u64;
                if let Some(link) = self.link.take() {
                    link.close(CLIENT_CLOSE_CODE, "heartbeat timeout");
                }
                self.on_connection_lost(ClientError::HeartbeatTimeout { timeout_ms });
            }
        }
    }

    // === Sending ===

    fn send_or_queue(&mut self, message: OutboundMessage) -> ClientResult<SendOutcome> {
        if self.state.is_connected() && self.link.is_some() {
            match self.write(&message) {
                Ok(()) => return Ok(SendOutcome::Sent),
                Err(err) => {
                    self.queue.requeue_front(message);
                    self.shared.set_queued(self.queue.len());
                    self.on_connection_lost(err);
                    return Ok(SendOutcome::Queued);
                }
            }
        }

        let outcome = self.queue.push(message).map_err(|full| ClientError::QueueFull {
            capacity: full.capacity,
        })?;
        if outcome == SendOutcome::QueuedDroppedOldest {
            self.shared.record_dropped();
        }
        self.shared.set_queued(self.queue.len());
        tracing::debug!(
            analysis_id = %self.analysis_id,
            state = %self.state,
            queued = self.queue.len(),
            "Message queued"
        );
        Ok(outcome)
    }

    fn flush_queue(&mut self) {
        let pending = self.queue.len();
        while let Some(message) = self.queue.pop_front() {
            if let Err(err) = self.write(&message) {
                self.queue.requeue_front(message);
                self.shared.set_queued(self.queue.len());
                self.on_connection_lost(err);
                return;
            }
        }
        self.shared.set_queued(0);
        if pending > 0 {
            tracing::debug!(analysis_id = %self.analysis_id, flushed = pending, "Outbound queue flushed");
        }
    }

    /// Write directly; a failed write is treated as a lost connection
    fn write_or_recover(&mut self, message: &OutboundMessage) -> bool {
        match self.write(message) {
            Ok(()) => true,
            Err(err) => {
                self.on_connection_lost(err);
                false
            }
        }
    }

    /// Hand the frame to the I/O task; a write that later fails or stalls
    /// comes back as a transport error event
    fn write(&self, message: &OutboundMessage) -> ClientResult<()> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| ClientError::transport("not connected"))?;
        let text = MessageCodec::encode(message).map_err(ClientError::protocol)?;
        link.send_text(text)?;
        self.shared.record_sent();
        tracing::trace!(message_type = %message.kind, "Message sent");
        Ok(())
    }

    // === State ===

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        let previous = std::mem::replace(&mut self.state, next);
        self.shared.set_state(next);
        tracing::info!(
            analysis_id = %self.analysis_id,
            from = %previous,
            to = %next,
            "Connection state changed"
        );
        self.dispatcher.notify_state(&next);
    }

    fn resolve_waiters(&mut self, result: &ClientResult<()>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

async fn poll_connect(slot: &mut Option<ConnectFuture>) -> ClientResult<Box<dyn Transport>> {
    match slot {
        Some(future) => {
            let result = future.await;
            *slot = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn next_event(slot: &mut Option<Link>) -> Option<TransportEvent> {
    match slot {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
