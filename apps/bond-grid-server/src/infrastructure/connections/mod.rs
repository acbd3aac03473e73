//! Connection Hub
//!
//! In-process [`UpdateSink`] backed by one bounded `mpsc` queue per
//! connection. Sends never wait: a full queue is reported as backpressure
//! and the message is dropped for that connection only.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::{PushMessage, SinkError, UpdateSink};
use crate::domain::subscription::ConnectionId;
use crate::infrastructure::metrics;

/// Registry of live connections and their outbound queues.
#[derive(Debug)]
pub struct ConnectionHub {
    senders: RwLock<HashMap<ConnectionId, mpsc::Sender<PushMessage>>>,
    capacity: usize,
}

impl ConnectionHub {
    /// Create a hub whose per-connection queues hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Open a connection and return the receiving end of its queue.
    ///
    /// Re-opening an existing id replaces (and closes) its previous queue.
    pub fn connect(&self, connection: ConnectionId) -> mpsc::Receiver<PushMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let count = {
            let mut senders = self.senders.write();
            senders.insert(connection.clone(), tx);
            senders.len()
        };
        metrics::set_connections(count);
        tracing::info!(connection = %connection, connections = count, "Connection opened");
        rx
    }

    /// Close a connection. Returns whether it was open.
    pub fn disconnect(&self, connection: &ConnectionId) -> bool {
        let (removed, count) = {
            let mut senders = self.senders.write();
            let removed = senders.remove(connection).is_some();
            (removed, senders.len())
        };
        if removed {
            metrics::set_connections(count);
            tracing::info!(connection = %connection, connections = count, "Connection closed");
        }
        removed
    }

    /// Whether a connection is open.
    #[must_use]
    pub fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.senders.read().contains_key(connection)
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.senders.read().len()
    }

    /// Whether no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senders.read().is_empty()
    }
}

#[async_trait]
impl UpdateSink for ConnectionHub {
    async fn send(
        &self,
        connection: &ConnectionId,
        message: PushMessage,
    ) -> Result<(), SinkError> {
        let sender = self
            .senders
            .read()
            .get(connection)
            .cloned()
            .ok_or_else(|| SinkError::UnknownConnection(connection.clone()))?;

        sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => SinkError::Backpressure(connection.clone()),
            TrySendError::Closed(_) => SinkError::Closed(connection.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bond::CANONICAL_TIER;
    use crate::domain::bond::tests::sample_bond;
    use crate::domain::grid::RecordRow;

    fn message() -> PushMessage {
        PushMessage::BondUpdated(RecordRow {
            row: sample_bond("BOND0001", CANONICAL_TIER).to_row(),
            is_group: true,
        })
    }

    #[tokio::test]
    async fn delivers_to_connected_receiver() {
        let hub = ConnectionHub::new(4);
        let id = ConnectionId::from("c1");
        let mut rx = hub.connect(id.clone());

        hub.send(&id, message()).await.unwrap();
        assert_eq!(rx.recv().await, Some(message()));
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let hub = ConnectionHub::new(4);
        let id = ConnectionId::from("ghost");
        assert_eq!(
            hub.send(&id, message()).await,
            Err(SinkError::UnknownConnection(id))
        );
    }

    #[tokio::test]
    async fn full_queue_reports_backpressure() {
        let hub = ConnectionHub::new(1);
        let id = ConnectionId::from("slow");
        let _rx = hub.connect(id.clone());

        hub.send(&id, message()).await.unwrap();
        assert_eq!(
            hub.send(&id, message()).await,
            Err(SinkError::Backpressure(id))
        );
    }

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let hub = ConnectionHub::new(4);
        let id = ConnectionId::from("gone");
        drop(hub.connect(id.clone()));

        assert_eq!(hub.send(&id, message()).await, Err(SinkError::Closed(id)));
    }

    #[tokio::test]
    async fn disconnect_removes_queue() {
        let hub = ConnectionHub::new(4);
        let id = ConnectionId::from("c1");
        let mut rx = hub.connect(id.clone());

        assert!(hub.disconnect(&id));
        assert!(!hub.disconnect(&id));
        assert!(hub.is_empty());
        assert_eq!(rx.recv().await, None);
    }
}
