//! Configuration Module
//!
//! Typed settings for the grid server, loaded from environment variables.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, DatasetSettings, GridConfig, ServerSettings, TickerSettings,
};
