//! Domain Layer - Records, grid protocol and subscriptions.
//!
//! Pure types and algorithms with no I/O. The query engine is generic over
//! any record type that publishes a column schema; the bond module is one
//! such record type.

/// Bond records and their client projection.
pub mod bond;

/// Grid request/response shapes and the tiered-record trait.
pub mod grid;

/// Generic filtering, sorting and distinct-value extraction.
pub mod query;

/// Connection subscriptions to live updates.
pub mod subscription;
