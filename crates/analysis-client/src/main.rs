//! analysis-watch: follow one analysis from the terminal
//!
//! Run with:
//! ```bash
//! ANALYSIS_WS_URL=ws://localhost:8000/ws/analysis cargo run -p analysis-client -- <analysis-id>
//! ```
//!
//! Configuration is loaded from environment variables (and `.env`).

use analysis_client::{AnalysisProgress, AnalysisWatch, ConnectionController};
use analysis_common::{try_init_tracing_with_config, ClientConfig, ClientError, FallbackMode, TracingConfig};
use anyhow::Context;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "analysis-watch failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    let analysis_id = std::env::args()
        .nth(1)
        .context("usage: analysis-watch <analysis-id>")?;
    let fallback = config.reconnect.fallback;

    info!(
        env = ?config.env,
        analysis_id = %analysis_id,
        heartbeat_ms = config.heartbeat.interval_ms,
        max_attempts = config.reconnect.max_attempts,
        "Configuration loaded"
    );

    let controller = ConnectionController::with_websocket(config, analysis_id)?;
    let mut watch = AnalysisWatch::start(&controller).await?;

    let connector = controller.clone();
    tokio::spawn(async move {
        if let Err(e) = connector.connect().await {
            warn!(error = %e, "Initial connection did not complete");
        }
    });

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break Ok(());
            }
            changed = watch.changed() => {
                let progress = changed?;
                report(&progress);

                if progress.is_finished() {
                    break Ok(());
                }
                if let Some(err) = progress.connection_error.as_ref().filter(|e| is_terminal(e, fallback)) {
                    break Err(anyhow::anyhow!(err.clone()));
                }
            }
        }
    };

    drop(watch);
    controller.disconnect().await;
    controller.shutdown().await;
    outcome
}

fn report(progress: &AnalysisProgress) {
    if progress.failed {
        let detail = progress
            .last_error
            .as_ref()
            .map(|e| format!("{}: {}", e.error_code, e.error_message));
        error!(analysis_id = %progress.analysis_id, error = detail.as_deref().unwrap_or("-"), "Analysis failed");
        return;
    }

    if let Some(result) = &progress.result {
        info!(
            analysis_id = %progress.analysis_id,
            is_fake = result.is_fake,
            confidence = result.confidence_score,
            regions = result.suspicious_regions.len(),
            "Analysis complete"
        );
        return;
    }

    info!(
        analysis_id = %progress.analysis_id,
        connection = %progress.connection,
        stage = progress.stage.map_or("-", |s| s.as_str()),
        percent = (progress.progress * 100.0).round() as u64,
        frames = progress.frames_processed.unwrap_or(0),
        total_frames = progress.total_frames.unwrap_or(0),
        message = progress.message.as_deref().unwrap_or(""),
        "Progress"
    );
}

/// Errors after which the client will not connect again on its own
fn is_terminal(err: &ClientError, fallback: FallbackMode) -> bool {
    match err {
        ClientError::Auth { .. } | ClientError::Config(_) => true,
        ClientError::ReconnectExhausted { .. } => fallback == FallbackMode::Stop,
        _ => false,
    }
}
