//! Application Layer - Use cases and port definitions.
//!
//! Row serving and the hub surface a transport drives, plus the outbound
//! port through which live updates leave the process.

/// Port interfaces for outbound delivery.
pub mod ports;

/// Row serving and hub services.
pub mod services;
