//! Health Check and Metrics Endpoint
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status: dataset size, connections, subscriptions, ticker
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (dataset loaded)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::connections::ConnectionHub;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::store::BondStore;
use crate::infrastructure::ticker::TickStats;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Server version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// In-memory dataset.
    pub dataset: DatasetStatus,
    /// Open connections.
    pub connections: usize,
    /// Active update subscriptions.
    pub subscriptions: usize,
    /// Price simulation.
    pub ticker: TickerStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Serving, but the simulation has failed cycles.
    Degraded,
    /// No data to serve.
    Unhealthy,
}

/// Dataset size.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DatasetStatus {
    /// Instruments.
    pub instruments: usize,
    /// Records across all tiers.
    pub records: usize,
}

/// Ticker totals.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickerStatus {
    /// Completed cycles.
    pub cycles: u64,
    /// Failed cycles.
    pub failures: u64,
    /// Records changed.
    pub mutated: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    store: Arc<BondStore>,
    registry: Arc<SubscriptionRegistry>,
    connections: Arc<ConnectionHub>,
    ticker: Arc<TickStats>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        store: Arc<BondStore>,
        registry: Arc<SubscriptionRegistry>,
        connections: Arc<ConnectionHub>,
        ticker: Arc<TickStats>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            store,
            registry,
            connections,
            ticker,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.store.record_count() > 0 {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let dataset = DatasetStatus {
        instruments: state.store.instrument_count(),
        records: state.store.record_count(),
    };
    let ticker = TickerStatus {
        cycles: state.ticker.cycles(),
        failures: state.ticker.failures(),
        mutated: state.ticker.mutated(),
    };

    HealthResponse {
        status: determine_health_status(&dataset, &ticker),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        dataset,
        connections: state.connections.len(),
        subscriptions: state.registry.len(),
        ticker,
    }
}

const fn determine_health_status(dataset: &DatasetStatus, ticker: &TickerStatus) -> HealthStatus {
    if dataset.records == 0 {
        HealthStatus::Unhealthy
    } else if ticker.failures > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::bond::CANONICAL_TIER;
    use crate::domain::bond::tests::sample_bond;
    use crate::domain::subscription::{ConnectionId, SubscriptionFilter};

    fn state(store: BondStore) -> Arc<HealthServerState> {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.subscribe(ConnectionId::from("c1"), SubscriptionFilter::all());
        let connections = Arc::new(ConnectionHub::new(8));
        let _rx = connections.connect(ConnectionId::from("c1"));
        Arc::new(HealthServerState::new(
            "test".to_string(),
            Arc::new(store),
            registry,
            connections,
            Arc::new(TickStats::default()),
        ))
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_dataset_and_ticker() {
        let loaded = DatasetStatus {
            instruments: 1,
            records: 5,
        };
        let empty = DatasetStatus {
            instruments: 0,
            records: 0,
        };
        let clean = TickerStatus {
            cycles: 10,
            failures: 0,
            mutated: 3,
        };
        let failing = TickerStatus {
            failures: 2,
            ..clean
        };

        assert_eq!(determine_health_status(&loaded, &clean), HealthStatus::Healthy);
        assert_eq!(determine_health_status(&loaded, &failing), HealthStatus::Degraded);
        assert_eq!(determine_health_status(&empty, &clean), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let store = BondStore::from_bonds([
            sample_bond("B1", CANONICAL_TIER),
            sample_bond("B1", "Tier2"),
        ]);
        let (status, body) = get(state(store), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["dataset"]["instruments"], 1);
        assert_eq!(json["dataset"]["records"], 2);
        assert_eq!(json["connections"], 1);
        assert_eq!(json["subscriptions"], 1);
    }

    #[tokio::test]
    async fn readiness_requires_data() {
        let (status, _) = get(state(BondStore::default()), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let store = BondStore::from_bonds([sample_bond("B1", CANONICAL_TIER)]);
        let (status, body) = get(state(store), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"READY");
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get(state(BondStore::default()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }
}
