//! Bond Grid Server Binary
//!
//! Generates the bond dataset, starts the price simulation and the update
//! fan-out, and serves health and metrics until shut down.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin bond-grid-server
//! ```
//!
//! # Environment Variables
//!
//! - `BOND_COUNT`: Instruments to generate (default: 3000)
//! - `BOND_SEED`: RNG seed for a reproducible dataset (default: random)
//! - `TICK_INTERVAL_MS`: Price simulation period (default: 250)
//! - `UPDATE_PROBABILITY`: Per-record change chance per cycle (default: 0.02)
//! - `TICK_FAILURE_BACKOFF_MS`: Pause after a failed cycle (default: 1000)
//! - `FLUSH_INTERVAL_MS`: Update flush period (default: 250)
//! - `CONNECTION_BUFFER_CAPACITY`: Per-connection push queue (default: 1024)
//! - `GRID_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: bond-grid-server)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use bond_grid_server::application::ports::UpdateSink;
use bond_grid_server::{
    BondGenerator, BondStore, ConnectionHub, GridConfig, HealthServer, HealthServerState,
    MarketBook, SubscriptionRegistry, TickGenerator, UpdateBroadcaster, init_metrics,
    init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialise telemetry")?;

    tracing::info!("Starting Bond Grid Server");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = GridConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Dataset
    let mut generator = BondGenerator::new(config.dataset.seed);
    let store = Arc::new(BondStore::generate(config.dataset.bond_count, &mut generator));

    // Connections and subscriptions
    let registry = Arc::new(SubscriptionRegistry::new());
    let connections = Arc::new(ConnectionHub::new(
        config.broadcast.connection_buffer_capacity,
    ));
    let sink: Arc<dyn UpdateSink> = Arc::clone(&connections) as Arc<dyn UpdateSink>;

    // Update fan-out
    let (broadcaster, flush_task) = UpdateBroadcaster::start(
        Arc::clone(&registry),
        sink,
        config.broadcast.flush_interval,
    );

    // Price simulation
    let ticker = TickGenerator::new(
        config.ticker.clone(),
        config.dataset.seed,
        Arc::clone(&store) as Arc<dyn MarketBook>,
        broadcaster,
        shutdown_token.clone(),
    )?;
    let tick_stats = ticker.stats();
    let ticker_handle = tokio::spawn(ticker.run());

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&connections),
        tick_stats,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(
        instruments = store.instrument_count(),
        records = store.record_count(),
        "Bond grid server ready"
    );

    await_shutdown(shutdown_token).await;

    if let Err(e) = ticker_handle.await {
        tracing::error!(error = %e, "Tick generator ended abnormally");
    }
    if let Err(e) = health_handle.await {
        tracing::error!(error = %e, "Health server ended abnormally");
    }
    flush_task.shutdown().await;

    tracing::info!("Bond grid server stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GridConfig) {
    tracing::info!(
        bond_count = config.dataset.bond_count,
        seeded = config.dataset.seed.is_some(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        tick_interval_ms = config.ticker.interval.as_millis(),
        update_probability = config.ticker.update_probability,
        flush_interval_ms = config.broadcast.flush_interval.as_millis(),
        connection_buffer_capacity = config.broadcast.connection_buffer_capacity,
        "Simulation and fan-out settings"
    );
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
    tracing::info!("Graceful shutdown started");
}
