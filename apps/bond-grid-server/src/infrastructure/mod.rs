//! Infrastructure Layer - Adapters, background tasks and process plumbing.
//!
//! This layer contains the in-memory store, the concrete update sink, the
//! periodic tasks that drive live updates, and the ambient services
//! (configuration, telemetry, metrics, health).

/// Coalescing update buffer and flush task.
pub mod broadcast;

/// Configuration from environment variables.
pub mod config;

/// In-process connection queues implementing the update sink port.
pub mod connections;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory bond store and mock dataset generator.
pub mod store;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Periodic price simulation.
pub mod ticker;
