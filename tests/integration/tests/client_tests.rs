//! Client Integration Tests
//!
//! Drive the tungstenite transport against an in-process axum server.
//!
//! Run with: cargo test -p integration-tests --test client_tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_client::{AnalysisWatch, ConnectionController, ConnectionState};
use analysis_common::{ClientError, FallbackMode};
use analysis_protocol::{AnalysisStage, OutboundMessage};
use integration_tests::{status_update, wait_until, TestServer};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

fn record_errors(controller: &ConnectionController) -> Arc<Mutex<Vec<ClientError>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    controller
        .dispatcher()
        .on_error(Arc::new(move |err: &ClientError| {
            sink.lock().unwrap().push(err.clone());
        }));
    errors
}

// ============================================================================
// Connect and receive
// ============================================================================

#[tokio::test]
async fn test_connect_and_follow_progress() {
    let server = TestServer::start_with_token(Some("secret")).await.unwrap();
    let controller =
        ConnectionController::with_websocket(server.client_config(Some("secret")), "a1").unwrap();
    let mut watch = AnalysisWatch::start(&controller).await.unwrap();

    controller.connect().await.unwrap();
    assert_eq!(controller.state(), ConnectionState::Connected);
    wait_until(WAIT, || server.received_types() == ["subscribe_analysis"])
        .await
        .unwrap();

    server.push_json(&status_update("a1", "model_inference", 0.5));
    let progress = tokio::time::timeout(WAIT, async {
        loop {
            let progress = watch.changed().await.unwrap();
            if progress.stage.is_some() {
                return progress;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(progress.stage, Some(AnalysisStage::ModelInference));
    assert_eq!(progress.progress, 0.5);
    assert_eq!(progress.message.as_deref(), Some("model_inference running"));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_queued_messages_sent_after_connect() {
    let server = TestServer::start().await.unwrap();
    let controller = ConnectionController::with_websocket(server.client_config(None), "a1").unwrap();

    controller.send(OutboundMessage::get_progress()).await.unwrap();
    controller
        .send(OutboundMessage::get_current_status())
        .await
        .unwrap();
    controller.connect().await.unwrap();

    wait_until(WAIT, || server.received().len() == 2).await.unwrap();
    assert_eq!(server.received_types(), ["get_progress", "get_current_status"]);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_disconnect() {
    let server = TestServer::start().await.unwrap();
    let controller = ConnectionController::with_websocket(server.client_config(None), "a1").unwrap();
    controller.connect().await.unwrap();

    server.push_json(&json!({"event_type": "status_update", "progress": 7}));
    server.push_json(&json!({"event_type": "no_such_event"}));

    wait_until(WAIT, || controller.stats().frames_rejected == 2)
        .await
        .unwrap();
    assert_eq!(controller.state(), ConnectionState::Connected);
    assert_eq!(server.connection_count(), 1);

    controller.shutdown().await;
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let server = TestServer::start().await.unwrap();
    let controller = ConnectionController::with_websocket(server.client_config(None), "a1").unwrap();
    controller.connect().await.unwrap();
    wait_until(WAIT, || server.open_count() == 1).await.unwrap();

    server.drop_connections();

    wait_until(WAIT, || server.connection_count() == 2).await.unwrap();
    wait_until(WAIT, || controller.state() == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(controller.stats().reconnects, 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_prevents_reconnect() {
    let server = TestServer::start().await.unwrap();
    let controller = ConnectionController::with_websocket(server.client_config(None), "a1").unwrap();
    controller.connect().await.unwrap();

    controller.disconnect().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(controller.state(), ConnectionState::Disconnected);
    assert_eq!(server.connection_count(), 1);
    wait_until(WAIT, || server.open_count() == 0).await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_keeps_connection_alive() {
    let server = TestServer::start().await.unwrap();
    let mut config = server.client_config(None);
    config.heartbeat.interval_ms = 100;
    config.heartbeat.timeout_ms = 80;
    let controller = ConnectionController::with_websocket(config, "a1").unwrap();
    controller.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(550)).await;

    assert!(server.received_types().iter().filter(|t| *t == "ping").count() >= 3);
    assert_eq!(controller.state(), ConnectionState::Connected);
    assert_eq!(server.connection_count(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_missing_pong_forces_reconnect() {
    let server = TestServer::start().await.unwrap();
    server.ignore_pings();
    let mut config = server.client_config(None);
    config.heartbeat.interval_ms = 100;
    config.heartbeat.timeout_ms = 50;
    let controller = ConnectionController::with_websocket(config, "a1").unwrap();
    let errors = record_errors(&controller);
    controller.connect().await.unwrap();

    wait_until(WAIT, || server.connection_count() >= 2).await.unwrap();
    assert!(errors
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ClientError::HeartbeatTimeout { .. })));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_exhaustion_with_stop_fallback() {
    let server = TestServer::start().await.unwrap();
    let mut config = server.client_config(None);
    // Nothing listens on the discard port
    config.endpoint = "ws://127.0.0.1:9/ws/analysis".to_string();
    config.reconnect.max_attempts = 2;
    config.reconnect.fallback = FallbackMode::Stop;
    let controller = ConnectionController::with_websocket(config, "a1").unwrap();

    let err = tokio::time::timeout(WAIT, controller.connect())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err, ClientError::ReconnectExhausted { attempts: 2 });
    assert_eq!(controller.state(), ConnectionState::Error);
    assert_eq!(controller.stats().reconnect_attempts, 2);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_token_rejected_at_handshake() {
    let server = TestServer::start_with_token(Some("secret")).await.unwrap();
    let controller = ConnectionController::with_websocket(server.client_config(None), "a1").unwrap();

    let err = controller.connect().await.unwrap_err();

    assert!(matches!(err, ClientError::Auth { code: 401, .. }));
    assert_eq!(controller.state(), ConnectionState::Error);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn test_wrong_token_closed_with_policy_violation() {
    let server = TestServer::start_with_token(Some("secret")).await.unwrap();
    let controller =
        ConnectionController::with_websocket(server.client_config(Some("wrong")), "a1").unwrap();
    let errors = record_errors(&controller);

    // The socket opens before the server rejects the token
    controller.connect().await.unwrap();
    wait_until(WAIT, || controller.state() == ConnectionState::Error)
        .await
        .unwrap();

    let errors = errors.lock().unwrap().clone();
    assert!(matches!(errors.as_slice(), [ClientError::Auth { code: 1008, .. }]));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(controller.state(), ConnectionState::Error);
}
