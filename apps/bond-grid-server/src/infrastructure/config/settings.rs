//! Grid Server Configuration Settings
//!
//! Every setting has a default; environment variables override them. Values
//! that fail to parse or fall outside their valid range are rejected.

use std::str::FromStr;
use std::time::Duration;

/// Mock dataset settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSettings {
    /// Number of instruments to generate.
    pub bond_count: usize,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            bond_count: 3000,
            seed: None,
        }
    }
}

/// Price simulation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSettings {
    /// Time between simulation cycles.
    pub interval: Duration,
    /// Chance that any one record changes in a cycle.
    pub update_probability: f64,
    /// Pause after a failed cycle.
    pub failure_backoff: Duration,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            update_probability: 0.02,
            failure_backoff: Duration::from_millis(1000),
        }
    }
}

/// Update fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Time between coalescing buffer flushes.
    pub flush_interval: Duration,
    /// Outbound queue depth per connection.
    pub connection_buffer_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(250),
            connection_buffer_capacity: 1024,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete grid server configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridConfig {
    /// Mock dataset.
    pub dataset: DatasetSettings,
    /// Price simulation.
    pub ticker: TickerSettings,
    /// Update fan-out.
    pub broadcast: BroadcastSettings,
    /// Ports.
    pub server: ServerSettings,
}

impl GridConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable does not parse or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value does not parse or is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Self::default();

        let dataset = DatasetSettings {
            bond_count: env.parse("BOND_COUNT", defaults.dataset.bond_count)?,
            seed: env.parse_optional("BOND_SEED")?,
        };

        let ticker = TickerSettings {
            interval: env.millis("TICK_INTERVAL_MS", defaults.ticker.interval)?,
            update_probability: env
                .parse("UPDATE_PROBABILITY", defaults.ticker.update_probability)?,
            failure_backoff: env
                .millis("TICK_FAILURE_BACKOFF_MS", defaults.ticker.failure_backoff)?,
        };

        let broadcast = BroadcastSettings {
            flush_interval: env.millis("FLUSH_INTERVAL_MS", defaults.broadcast.flush_interval)?,
            connection_buffer_capacity: env.parse(
                "CONNECTION_BUFFER_CAPACITY",
                defaults.broadcast.connection_buffer_capacity,
            )?,
        };

        let server = ServerSettings {
            health_port: env.parse("GRID_HEALTH_PORT", defaults.server.health_port)?,
        };

        let config = Self {
            dataset,
            ticker,
            broadcast,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::OutOfRange` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let out_of_range = |key: &str, value: String, expected: &str| ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            expected: expected.to_string(),
        };

        if self.dataset.bond_count == 0 {
            return Err(out_of_range("BOND_COUNT", "0".to_string(), "at least 1"));
        }
        if !(0.0..=1.0).contains(&self.ticker.update_probability) {
            return Err(out_of_range(
                "UPDATE_PROBABILITY",
                self.ticker.update_probability.to_string(),
                "between 0 and 1",
            ));
        }
        for (key, interval) in [
            ("TICK_INTERVAL_MS", self.ticker.interval),
            ("TICK_FAILURE_BACKOFF_MS", self.ticker.failure_backoff),
            ("FLUSH_INTERVAL_MS", self.broadcast.flush_interval),
        ] {
            if interval.is_zero() {
                return Err(out_of_range(key, "0".to_string(), "a positive duration"));
            }
        }
        if self.broadcast.connection_buffer_capacity == 0 {
            return Err(out_of_range(
                "CONNECTION_BUFFER_CAPACITY",
                "0".to_string(),
                "at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// A variable parsed but is outside its valid range.
    #[error("environment variable {key}={value} must be {expected}")]
    OutOfRange {
        /// Variable name.
        key: String,
        /// Parsed value.
        value: String,
        /// Human-readable constraint.
        expected: String,
    },
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    fn parse_optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(raw) = (self.lookup)(key) else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
            })
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse_optional::<u64>(key)?
            .map_or(default, Duration::from_millis))
    }
}
