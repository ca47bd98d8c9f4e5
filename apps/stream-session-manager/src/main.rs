//! Stream Session Manager Binary
//!
//! Opens the configured subscriptions, repeats drain/export cycles per
//! session, and tears everything down on shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stream-session-manager
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `SESSION_CHANNELS`: Comma-separated channel list, e.g.
//!   `coinbase.spot.ticker.BTC-USD,kraken.spot.trade.ETH-USD`
//!
//! ## Optional
//! - `SESSION_ENGINE_URL`: Upstream feed URL (default: `ws://localhost:5050/ws`)
//! - `SESSION_EXPORT_DIR`: Artifact directory (default: `exports`)
//! - `SESSION_WINDOW_SECS`: Collection window per cycle (default: 5)
//! - `SESSION_CHANNEL_CAPACITY`: Per-handle delivery capacity (default: 1024)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use stream_session_manager::infrastructure::telemetry;
use stream_session_manager::{
    CsvExporter, DrainStop, ManagerConfig, SessionError, SessionRegistry, SubscriptionSpec,
    WsEngine, WsEngineConfig,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting stream session manager");

    let config = ManagerConfig::from_env()?;
    log_config(&config);

    let engine = Arc::new(WsEngine::new(WsEngineConfig {
        url: config.engine_url.clone(),
        channel_capacity: config.channel_capacity,
    }));
    let registry = Arc::new(SessionRegistry::new(engine));
    let exporter = Arc::new(CsvExporter::new(config.export_dir.clone())?);

    let shutdown_token = CancellationToken::new();

    let mut workers = Vec::new();
    for spec in config.channels.clone() {
        let registry = Arc::clone(&registry);
        let exporter = Arc::clone(&exporter);
        let token = shutdown_token.clone();
        let window = config.window;
        workers.push(tokio::spawn(async move {
            if let Err(e) = run_session(&registry, &exporter, spec.clone(), window, token).await {
                tracing::error!(channel = %spec.channel(), error = %e, "session worker failed");
            }
        }));
    }

    tracing::info!("Session manager ready");

    await_shutdown(shutdown_token).await;

    for worker in workers {
        let _ = worker.await;
    }

    tracing::info!("Stream session manager stopped");
    Ok(())
}

/// Drive one subscription: open it, drain/export per window, close it
/// on shutdown or when the engine ends the stream.
async fn run_session(
    registry: &SessionRegistry,
    exporter: &CsvExporter,
    spec: SubscriptionSpec,
    window: Duration,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let session = registry.open(spec.clone()).await?;

    loop {
        if token.is_cancelled() {
            break;
        }

        let report = tokio::select! {
            report = registry.drain_session(&session, window) => report?,
            () = token.cancelled() => break,
        };

        match &report.stopped {
            DrainStop::WindowElapsed => {}
            DrainStop::StreamClosed => {
                tracing::warn!(channel = %spec.channel(), "engine ended the stream");
            }
            DrainStop::SessionClosed => break,
            DrainStop::ReceiveError(e) => {
                tracing::warn!(channel = %spec.channel(), error = %e, "receive fault during window");
            }
        }

        if session.buffered_len() > 0 {
            let artifact = exporter.export(&session)?;
            tracing::info!(
                channel = %spec.channel(),
                rows = artifact.row_count(),
                path = %artifact.path().display(),
                "window exported"
            );
        }

        if !report.stopped.stream_live() {
            break;
        }
    }

    match registry.close(&spec).await {
        // Already gone: closed by a shutdown path that won the race.
        Ok(()) | Err(SessionError::NotSubscribed(_)) => {}
        Err(e) => tracing::warn!(channel = %spec.channel(), error = %e, "close failed"),
    }

    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ManagerConfig) {
    tracing::info!(
        engine_url = %config.engine_url,
        export_dir = %config.export_dir.display(),
        window_secs = config.window.as_secs(),
        channels = config.channels.len(),
        "Configuration loaded"
    );
    for spec in &config.channels {
        tracing::debug!(channel = %spec.channel(), "configured subscription");
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
