//! Offline Sync - control server
//!
//! Runs the engine against the real network with file-backed storage and
//! exposes it over a small HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offline_sync::connectivity::HttpProbe;
use offline_sync::{create_router, AppState, Config, Engine, EngineSettings, FileStore, HttpNetwork};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Main entry point for the offline sync server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the data directory and restore cache and sync queue
/// 4. Start the sync and cleanup timers
/// 5. Serve the control API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Offline Sync Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, data_dir={}, sync_interval={}s, cleanup_interval={}s, probe_url={:?}",
        config.server_port,
        config.data_dir.display(),
        config.sync_interval,
        config.cleanup_interval,
        config.probe_url
    );

    let durable = FileStore::open(&config.data_dir)
        .await
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let network = Arc::new(HttpNetwork::new().context("building HTTP client")?);

    let mut builder = Engine::builder(network.clone(), Arc::new(durable))
        .with_settings(EngineSettings::from(&config));
    if let Some(url) = &config.probe_url {
        builder = builder.with_probe(Arc::new(HttpProbe::new(network, url.clone(), PROBE_TIMEOUT)));
    }
    let engine = builder.build().await.context("restoring engine state")?;

    let state = AppState::new(engine);
    let timers = state.engine.start();
    info!("Background tasks started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    state.engine.shutdown();
    for timer in timers {
        let _ = timer.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
