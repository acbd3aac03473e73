#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Bond Grid Server - Windowed Grid Engine with Live Fan-out
//!
//! Serves filtered, sorted, grouped and paged rows from an in-memory bond
//! store, and keeps remote viewers in sync by pushing coalesced record
//! changes to every connection whose subscription matches.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Record types and pure algorithms
//!   - `bond`: Bond records, tiers and the client row projection
//!   - `query`: Column schemas, filter and sort models, distinct values
//!   - `grid`: Request/response protocol and grouped row variants
//!   - `subscription`: Per-connection update filters
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Push messages and the update sink
//!   - `services`: Row serving and the per-connection hub
//!
//! - **Infrastructure**: Adapters and background tasks
//!   - `store`: In-memory bond store and mock dataset
//!   - `broadcast`: Coalescing update buffer and flush task
//!   - `ticker`: Periodic price simulation
//!   - `connections`: Per-connection outbound queues
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//!                  ┌────────────┐  stage   ┌─────────────┐  flush  ┌────────────┐
//! TickGenerator ──►│ BondStore  │─────────►│ Broadcaster │────────►│ Connection │──► Client N
//!                  └────────────┘          └─────────────┘         │    Hub     │
//!                        ▲                                         └────────────┘
//!     GridHub::get_rows ─┘ (filter → sort → group/drill → page)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Records, query engine and grid protocol.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters, background tasks and process plumbing.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::bond::{Bond, BondRow, CANONICAL_TIER, MarketData};
pub use domain::grid::{GridRequest, GridResponse, GridRow, GroupRow, RecordRow, TieredRecord};
pub use domain::query::{FilterModel, Record, SortDirection, SortModel};
pub use domain::subscription::{ConnectionId, SubscriptionFilter, SubscriptionRegistry};

// Application
pub use application::ports::{BondUpdate, PushMessage, SinkError, UpdateSink};
pub use application::services::{BondRowService, GridHub, serve_rows};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, DatasetSettings, GridConfig, ServerSettings, TickerSettings,
};

// Store, fan-out and simulation
pub use infrastructure::broadcast::{FlushTask, UpdateBroadcaster};
pub use infrastructure::connections::ConnectionHub;
pub use infrastructure::store::{BondGenerator, BondStore, StoreError};
pub use infrastructure::ticker::{MarketBook, TickError, TickGenerator, TickStats};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
