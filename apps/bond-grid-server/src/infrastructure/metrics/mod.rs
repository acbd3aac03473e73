//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Ticks**: simulation cycles, failures and records mutated
//! - **Fan-out**: updates staged, dropped, flushed and delivered
//! - **Connections**: open connections and active subscriptions
//! - **Latency**: flush duration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the already installed handle.
///
/// # Errors
///
/// Returns `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// The Prometheus handle, if metrics were initialised.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!("bond_grid_ticks_total", "Completed simulation cycles");
    describe_counter!("bond_grid_tick_failures_total", "Failed simulation cycles");
    describe_counter!(
        "bond_grid_records_mutated_total",
        "Records changed by the simulation"
    );

    describe_counter!(
        "bond_grid_updates_staged_total",
        "Updates handed to the coalescing buffer"
    );
    describe_counter!(
        "bond_grid_updates_dropped_total",
        "Updates dropped before buffering, by reason"
    );
    describe_counter!("bond_grid_flushes_total", "Non-empty flush cycles");
    describe_counter!(
        "bond_grid_updates_delivered_total",
        "Rows delivered to connections"
    );
    describe_counter!(
        "bond_grid_delivery_failures_total",
        "Failed sends to a connection, by reason"
    );

    describe_gauge!("bond_grid_connections", "Open client connections");
    describe_gauge!("bond_grid_subscriptions", "Active update subscriptions");

    describe_histogram!(
        "bond_grid_flush_duration_seconds",
        "Time to fan one flush out to every recipient"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why an update never reached the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No subscription matched the record.
    NoSubscribers,
    /// The flush task has stopped.
    FlushStopped,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NoSubscribers => "no_subscribers",
            Self::FlushStopped => "flush_stopped",
        }
    }
}

/// Record a completed simulation cycle.
pub fn record_tick(records_mutated: u64) {
    counter!("bond_grid_ticks_total").increment(1);
    counter!("bond_grid_records_mutated_total").increment(records_mutated);
}

/// Record a failed simulation cycle.
pub fn record_tick_failure() {
    counter!("bond_grid_tick_failures_total").increment(1);
}

/// Record an update accepted for buffering.
pub fn record_update_staged() {
    counter!("bond_grid_updates_staged_total").increment(1);
}

/// Record an update dropped before buffering.
pub fn record_update_dropped(reason: DropReason) {
    counter!(
        "bond_grid_updates_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record one flush cycle.
pub fn record_flush(duration: Duration) {
    counter!("bond_grid_flushes_total").increment(1);
    histogram!("bond_grid_flush_duration_seconds").record(duration.as_secs_f64());
}

/// Record rows delivered to a connection.
pub fn record_updates_delivered(count: u64) {
    counter!("bond_grid_updates_delivered_total").increment(count);
}

/// Record a failed send.
pub fn record_delivery_failure(reason: &'static str) {
    counter!(
        "bond_grid_delivery_failures_total",
        "reason" => reason
    )
    .increment(1);
}

/// Update the open connection count.
pub fn set_connections(count: usize) {
    gauge!("bond_grid_connections").set(as_gauge(count));
}

/// Update the active subscription count.
pub fn set_subscriptions(count: usize) {
    gauge!("bond_grid_subscriptions").set(as_gauge(count));
}

#[allow(clippy::cast_precision_loss)]
const fn as_gauge(count: usize) -> f64 {
    count as f64
}

// =============================================================================
// Tests
// =============================================================================
