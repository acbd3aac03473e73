//! Application Services
//!
//! - `rows`: grid row serving (paging, grouping, drill-down)
//! - `hub`: the per-connection request surface

/// Grid row serving.
pub mod rows;

/// Connection-facing hub.
pub mod hub;

pub use hub::GridHub;
pub use rows::{BondRowService, serve_rows};
