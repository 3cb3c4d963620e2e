//! Test helpers for integration tests
//!
//! Provides an in-process analysis WebSocket server the real client can
//! connect to, plus small polling utilities.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_common::ClientConfig;
use anyhow::{bail, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// What the test asks every open socket to do
#[derive(Debug, Clone)]
enum ServerCommand {
    Frame(String),
    /// Drop the socket without a close frame
    Drop,
    Close(u16, String),
}

struct ServerState {
    token: Option<String>,
    answer_pings: AtomicBool,
    connections: AtomicUsize,
    open: AtomicUsize,
    received: Mutex<Vec<Value>>,
    commands: broadcast::Sender<ServerCommand>,
}

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    state: Arc<ServerState>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server that accepts any token
    pub async fn start() -> Result<Self> {
        Self::start_with_token(None).await
    }

    /// Start a server that requires `?token={token}`
    ///
    /// A missing token is refused during the handshake with HTTP 401; a wrong
    /// one is accepted and then closed with 1008.
    pub async fn start_with_token(token: Option<&str>) -> Result<Self> {
        let (commands, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            token: token.map(str::to_string),
            answer_pings: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            commands,
        });

        let app = Router::new()
            .route("/ws/analysis/:analysis_id", get(ws_handler))
            .with_state(Arc::clone(&state));

        // Port 0 lets the OS pick a free port
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Base endpoint; the client appends the analysis id
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws/analysis", self.addr)
    }

    /// Client configuration pointing at this server with fast retries
    pub fn client_config(&self, token: Option<&str>) -> ClientConfig {
        let mut config = ClientConfig::new(self.ws_url());
        config.token = token.map(str::to_string);
        config.connect_timeout_ms = 2_000;
        config.reconnect.base_delay_ms = 50;
        config.reconnect.max_delay_ms = 200;
        config.reconnect.jitter_ratio = 0.0;
        config
    }

    /// Handshakes accepted so far
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Sockets currently open
    pub fn open_count(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Stop replying to application pings
    pub fn ignore_pings(&self) {
        self.state.answer_pings.store(false, Ordering::SeqCst);
    }

    /// Send a frame to every open socket
    pub fn push_json(&self, frame: &Value) {
        let _ = self.state.commands.send(ServerCommand::Frame(frame.to_string()));
    }

    /// Drop every open socket without a close handshake
    pub fn drop_connections(&self) {
        let _ = self.state.commands.send(ServerCommand::Drop);
    }

    pub fn close_connections(&self, code: u16, reason: &str) {
        let _ = self
            .state
            .commands
            .send(ServerCommand::Close(code, reason.to_string()));
    }

    /// Every JSON frame received from clients, in arrival order
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// `type` of every received frame
    pub fn received_types(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|frame| frame["type"].as_str().map(str::to_string))
            .collect()
    }
}

async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    Path(analysis_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let provided = params.get("token").cloned();
    let authorized = match (&state.token, &provided) {
        (None, _) => true,
        (Some(_), None) => return StatusCode::UNAUTHORIZED.into_response(),
        (Some(expected), Some(provided)) => expected == provided,
    };

    ws.on_upgrade(move |socket| handle_socket(state, socket, analysis_id, authorized))
        .into_response()
}

async fn handle_socket(
    state: Arc<ServerState>,
    mut socket: WebSocket,
    analysis_id: String,
    authorized: bool,
) {
    if !authorized {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1008,
                reason: "invalid token".into(),
            })))
            .await;
        return;
    }

    state.connections.fetch_add(1, Ordering::SeqCst);
    state.open.fetch_add(1, Ordering::SeqCst);
    let mut commands = state.commands.subscribe();

    let hello = json!({
        "type": "connection_established",
        "analysis_id": analysis_id,
        "message": "Connected to analysis stream",
        "timestamp": timestamp()
    });
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        state.open.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
                        let is_ping = frame["type"] == "ping";
                        if let Ok(mut received) = state.received.lock() {
                            received.push(frame);
                        }
                        if is_ping && state.answer_pings.load(Ordering::SeqCst) {
                            let pong = json!({"type": "pong", "timestamp": timestamp()});
                            if socket.send(Message::Text(pong.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(ServerCommand::Frame(text)) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(ServerCommand::Drop) | Err(_) => break,
                    Ok(ServerCommand::Close(code, reason)) => {
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        }
    }

    state.open.fetch_sub(1, Ordering::SeqCst);
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// A valid `status_update` frame
pub fn status_update(analysis_id: &str, stage: &str, progress: f64) -> Value {
    json!({
        "event_type": "status_update",
        "analysis_id": analysis_id,
        "progress": progress,
        "current_stage": stage,
        "message": format!("{stage} running"),
        "timestamp": timestamp()
    })
}
