//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `UpdateSink`: unicast delivery of push messages to one connection
//!
//! The transport behind a sink (WebSocket, SSE, in-process channel) is an
//! infrastructure concern.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::bond::BondRow;
use crate::domain::grid::RecordRow;
use crate::domain::subscription::ConnectionId;

/// A bond row as pushed to subscribers.
pub type BondUpdate = RecordRow<BondRow>;

// =============================================================================
// Push Messages
// =============================================================================

/// Message pushed to a connection outside the request/response cycle.
///
/// Wire names match the grid client's handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum PushMessage {
    /// A single changed record, sent directly to one connection.
    #[serde(rename = "UpdateBond")]
    BondUpdated(BondUpdate),
    /// Changed records from one flush, however many matched.
    #[serde(rename = "BatchUpdateBonds")]
    BondsUpdated(Vec<BondUpdate>),
}

impl PushMessage {
    /// Wrap a flush batch. A batch of one is still a batch.
    ///
    /// Returns `None` for an empty batch.
    #[must_use]
    pub fn from_batch(updates: Vec<BondUpdate>) -> Option<Self> {
        (!updates.is_empty()).then_some(Self::BondsUpdated(updates))
    }

    /// Rows carried by the message.
    #[must_use]
    pub fn updates(&self) -> &[BondUpdate] {
        match self {
            Self::BondUpdated(update) => std::slice::from_ref(update),
            Self::BondsUpdated(updates) => updates,
        }
    }

    /// Number of rows carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates().len()
    }

    /// Whether the message carries no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates().is_empty()
    }
}

// =============================================================================
// Update Sink
// =============================================================================

/// Delivery failure for one connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// No such connection.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is full.
    #[error("Outbound queue full for connection {0}")]
    Backpressure(ConnectionId),

    /// The connection's receiver has gone away.
    #[error("Connection closed: {0}")]
    Closed(ConnectionId),
}

impl SinkError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownConnection(_) => "unknown_connection",
            Self::Backpressure(_) => "backpressure",
            Self::Closed(_) => "closed",
        }
    }
}

/// Port for delivering push messages to individual connections.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    /// Deliver one message to one connection.
    async fn send(&self, connection: &ConnectionId, message: PushMessage)
    -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::bond::CANONICAL_TIER;
    use crate::domain::bond::tests::sample_bond;

    fn update(instrument_id: &str) -> BondUpdate {
        RecordRow {
            row: sample_bond(instrument_id, CANONICAL_TIER).to_row(),
            is_group: true,
        }
    }

    #[test]
    fn batch_of_one_stays_a_batch() {
        let message = PushMessage::from_batch(vec![update("BOND0001")]).unwrap();
        assert!(matches!(message, PushMessage::BondsUpdated(ref rows) if rows.len() == 1));
        assert_eq!(message.len(), 1);
    }

    #[test]
    fn larger_batch_is_batch_message() {
        let message =
            PushMessage::from_batch(vec![update("BOND0001"), update("BOND0002")]).unwrap();
        assert!(matches!(message, PushMessage::BondsUpdated(_)));
        assert_eq!(message.len(), 2);
    }

    #[test]
    fn empty_batch_has_no_message() {
        assert!(PushMessage::from_batch(Vec::new()).is_none());
    }

    #[test]
    fn messages_serialize_with_type_tag() {
        let single = serde_json::to_value(PushMessage::BondUpdated(update("BOND0001"))).unwrap();
        assert_eq!(single["type"], "UpdateBond");
        assert_eq!(single["payload"]["instrumentId"], "BOND0001");
        assert_eq!(single["payload"]["isGroup"], json!(true));

        let one = serde_json::to_value(PushMessage::from_batch(vec![update("BOND0001")])).unwrap();
        assert_eq!(one["type"], "BatchUpdateBonds");
        assert_eq!(one["payload"].as_array().unwrap().len(), 1);

        let batch = serde_json::to_value(
            PushMessage::from_batch(vec![update("BOND0001"), update("BOND0002")]).unwrap(),
        )
        .unwrap();
        assert_eq!(batch["type"], "BatchUpdateBonds");
        assert_eq!(batch["payload"].as_array().unwrap().len(), 2);
    }
}
