//! Grid Hub
//!
//! The request surface a transport drives for each client connection:
//! open and close connections, page grid rows, drill into tiers, list
//! filter values, and manage the connection's live-update subscription.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::ports::PushMessage;
use crate::application::services::rows::BondRowService;
use crate::domain::bond::BondRow;
use crate::domain::grid::{GridRequest, GridResponse};
use crate::domain::subscription::{ConnectionId, SubscriptionFilter, SubscriptionRegistry};
use crate::infrastructure::connections::ConnectionHub;
use crate::infrastructure::metrics;

/// Per-connection entry point to row serving and live updates.
#[derive(Debug, Clone)]
pub struct GridHub {
    rows: BondRowService,
    registry: Arc<SubscriptionRegistry>,
    connections: Arc<ConnectionHub>,
}

impl GridHub {
    /// Create a hub.
    #[must_use]
    pub const fn new(
        rows: BondRowService,
        registry: Arc<SubscriptionRegistry>,
        connections: Arc<ConnectionHub>,
    ) -> Self {
        Self {
            rows,
            registry,
            connections,
        }
    }

    /// Open a connection with a fresh id. Push messages for it arrive on the
    /// returned receiver once it subscribes.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<PushMessage>) {
        let connection = ConnectionId::generate();
        let rx = self.connections.connect(connection.clone());
        (connection, rx)
    }

    /// Close a connection and drop its subscription.
    pub fn disconnect(&self, connection: &ConnectionId) {
        if self.registry.unsubscribe(connection) {
            metrics::set_subscriptions(self.registry.len());
        }
        self.connections.disconnect(connection);
    }

    /// Replace the connection's subscription filter.
    pub fn subscribe_to_filter(&self, connection: &ConnectionId, filter: SubscriptionFilter) {
        self.registry.subscribe(connection.clone(), filter);
        metrics::set_subscriptions(self.registry.len());
    }

    /// One page of grid rows.
    #[must_use]
    pub fn get_rows(&self, request: &GridRequest) -> GridResponse<BondRow> {
        self.rows.get_rows(request)
    }

    /// Non-canonical tiers of one instrument.
    #[must_use]
    pub fn get_tiers_for_bond(&self, instrument_id: &str) -> Vec<BondRow> {
        self.rows.tiers_for_bond(instrument_id)
    }

    /// Distinct values of a column, for set filters.
    #[must_use]
    pub fn get_distinct_values(&self, column: &str) -> Vec<String> {
        self.rows.distinct_values(column)
    }
}
