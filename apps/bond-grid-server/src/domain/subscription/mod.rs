//! Subscription Registry
//!
//! Tracks which live-update stream each connection wants. A subscription is
//! a pair of allow-lists (currencies, sectors); an empty list means "any".
//!
//! # Design
//!
//! Readers never iterate the live map. The flush path takes a
//! [`SubscriptionRegistry::snapshot`] and works on that, so connections can
//! subscribe and disconnect while a flush is in progress.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Opaque identifier of a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Which records a connection wants pushed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionFilter {
    /// Allowed currencies; empty allows all.
    pub currencies: Vec<String>,
    /// Allowed sectors; empty allows all.
    pub sectors: Vec<String>,
}

impl SubscriptionFilter {
    /// A filter that matches everything.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            currencies: Vec::new(),
            sectors: Vec::new(),
        }
    }

    /// Restrict to the given currencies.
    #[must_use]
    pub fn with_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currencies = currencies.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to the given sectors.
    #[must_use]
    pub fn with_sectors<I, S>(mut self, sectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sectors = sectors.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a record with this currency and sector passes the filter.
    ///
    /// Matching is exact and case-sensitive.
    #[must_use]
    pub fn matches(&self, currency: &str, sector: &str) -> bool {
        allows(&self.currencies, currency) && allows(&self.sectors, sector)
    }
}

fn allows(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|candidate| candidate == value)
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe map of connection → subscription filter.
///
/// # Example
///
/// ```rust
/// use bond_grid_server::domain::subscription::{
///     ConnectionId, SubscriptionFilter, SubscriptionRegistry,
/// };
///
/// let registry = SubscriptionRegistry::new();
/// let usd = ConnectionId::from("usd-desk");
/// registry.subscribe(usd.clone(), SubscriptionFilter::all().with_currencies(["USD"]));
/// registry.subscribe(ConnectionId::from("everything"), SubscriptionFilter::all());
///
/// assert_eq!(registry.matching("EUR", "Government").len(), 1);
/// assert_eq!(registry.matching("USD", "Government").len(), 2);
///
/// registry.unsubscribe(&usd);
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    filters: RwLock<HashMap<ConnectionId, SubscriptionFilter>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the filter for a connection.
    pub fn subscribe(&self, connection: ConnectionId, filter: SubscriptionFilter) {
        tracing::debug!(
            connection = %connection,
            currencies = ?filter.currencies,
            sectors = ?filter.sectors,
            "Subscription updated"
        );
        self.filters.write().insert(connection, filter);
    }

    /// Remove a connection's filter. Returns whether one existed.
    pub fn unsubscribe(&self, connection: &ConnectionId) -> bool {
        self.filters.write().remove(connection).is_some()
    }

    /// Connections whose filter matches the given currency and sector.
    #[must_use]
    pub fn matching(&self, currency: &str, sector: &str) -> Vec<ConnectionId> {
        self.filters
            .read()
            .iter()
            .filter(|(_, filter)| filter.matches(currency, sector))
            .map(|(connection, _)| connection.clone())
            .collect()
    }

    /// Whether any connection's filter matches.
    #[must_use]
    pub fn has_match(&self, currency: &str, sector: &str) -> bool {
        self.filters
            .read()
            .values()
            .any(|filter| filter.matches(currency, sector))
    }

    /// Point-in-time copy of every subscription.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ConnectionId, SubscriptionFilter)> {
        self.filters
            .read()
            .iter()
            .map(|(connection, filter)| (connection.clone(), filter.clone()))
            .collect()
    }

    /// The filter of one connection.
    #[must_use]
    pub fn get(&self, connection: &ConnectionId) -> Option<SubscriptionFilter> {
        self.filters.read().get(connection).cloned()
    }

    /// Number of subscribed connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    /// Whether no connection is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
