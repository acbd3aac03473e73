//! Coalescing Update Broadcaster
//!
//! Record changes are staged from any thread, coalesced per record, and
//! fanned out to subscribers on a fixed cadence.
//!
//! # Architecture
//!
//! ```text
//! TickGenerator ──stage()──► UpdateBroadcaster ──mpsc──► FlushWorker
//!                                                          │ CoalescingBuffer
//!                                                          │ (last write wins)
//!                                       every interval ────┤
//!                                                          ▼
//!                                     registry snapshot → one message per
//!                                     recipient → UpdateSink::send
//! ```
//!
//! The buffer has a single owner (the worker), so draining it is trivially
//! atomic. Anything still in the channel when a flush starts waits for the
//! next cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BondUpdate, PushMessage, UpdateSink};
use crate::domain::bond::Bond;
use crate::domain::grid::RecordRow;
use crate::domain::subscription::{ConnectionId, SubscriptionFilter, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Coalescing Buffer
// =============================================================================

/// Identity of a buffered update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateKey {
    /// Instrument id.
    pub instrument_id: String,
    /// Tier label.
    pub tier_id: String,
}

impl UpdateKey {
    fn of(update: &BondUpdate) -> Self {
        Self {
            instrument_id: update.row.instrument_id.clone(),
            tier_id: update.row.tier_id.clone(),
        }
    }
}

/// Pending updates keyed by record; a newer update replaces an older one
/// in place.
#[derive(Debug, Default)]
pub struct CoalescingBuffer {
    positions: HashMap<UpdateKey, usize>,
    updates: Vec<BondUpdate>,
}

impl CoalescingBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the pending update for a record.
    pub fn upsert(&mut self, update: BondUpdate) {
        match self.positions.get(&UpdateKey::of(&update)) {
            Some(&position) => self.updates[position] = update,
            None => {
                self.positions.insert(UpdateKey::of(&update), self.updates.len());
                self.updates.push(update);
            }
        }
    }

    /// Take every pending update, in first-staged order.
    pub fn drain(&mut self) -> Vec<BondUpdate> {
        self.positions.clear();
        std::mem::take(&mut self.updates)
    }

    /// Number of distinct pending records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Staging handle. Cheap to clone; every clone feeds the same flush task.
#[derive(Debug, Clone)]
pub struct UpdateBroadcaster {
    registry: Arc<SubscriptionRegistry>,
    tx: mpsc::UnboundedSender<BondUpdate>,
}

impl UpdateBroadcaster {
    /// Start a flush task and return its staging handle.
    pub fn start(
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<dyn UpdateSink>,
        flush_interval: Duration,
    ) -> (Self, FlushTask) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = FlushWorker::new(rx, Arc::clone(&registry), sink, cancel.clone());
        let handle = tokio::spawn(worker.run(flush_interval));

        tracing::info!(
            flush_interval_ms = flush_interval.as_millis(),
            "Update broadcaster started"
        );

        (
            Self { registry, tx },
            FlushTask {
                cancel,
                handle: Mutex::new(Some(handle)),
            },
        )
    }

    /// Stage a changed record for the next flush.
    ///
    /// Returns `false` if the update was dropped, either because no
    /// subscription matches it or because the flush task has stopped.
    pub fn stage(&self, bond: &Bond) -> bool {
        if !self.registry.has_match(&bond.currency, &bond.sector) {
            metrics::record_update_dropped(DropReason::NoSubscribers);
            return false;
        }

        let update = RecordRow {
            row: bond.to_row(),
            is_group: bond.is_canonical(),
        };

        if self.tx.send(update).is_err() {
            metrics::record_update_dropped(DropReason::FlushStopped);
            tracing::debug!(instrument_id = %bond.instrument_id, "Flush task stopped, update dropped");
            return false;
        }

        metrics::record_update_staged();
        true
    }
}

// =============================================================================
// Flush Worker
// =============================================================================

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Distinct records drained from the buffer.
    pub updates: usize,
    /// Connections that had at least one matching update.
    pub recipients: usize,
    /// Successful sends.
    pub delivered: usize,
    /// Failed sends.
    pub failed: usize,
}

struct FlushWorker {
    rx: mpsc::UnboundedReceiver<BondUpdate>,
    buffer: CoalescingBuffer,
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<dyn UpdateSink>,
    cancel: CancellationToken,
}

impl FlushWorker {
    fn new(
        rx: mpsc::UnboundedReceiver<BondUpdate>,
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<dyn UpdateSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            buffer: CoalescingBuffer::new(),
            registry,
            sink,
            cancel,
        }
    }

    async fn run(mut self, flush_interval: Duration) {
        let start = tokio::time::Instant::now() + flush_interval;
        let mut ticker = tokio::time::interval_at(start, flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush().await;
                }
                Some(update) = self.rx.recv() => self.buffer.upsert(update),
            }
        }

        self.absorb_pending();
        let report = self.flush().await;
        tracing::info!(
            final_updates = report.updates,
            final_recipients = report.recipients,
            "Update broadcaster stopped"
        );
    }

    /// Move everything already in the channel into the buffer.
    fn absorb_pending(&mut self) {
        while let Ok(update) = self.rx.try_recv() {
            self.buffer.upsert(update);
        }
    }

    async fn flush(&mut self) -> FlushReport {
        let updates = self.buffer.drain();
        if updates.is_empty() {
            return FlushReport::default();
        }

        let started = Instant::now();
        let batches = route(&updates, self.registry.snapshot());
        let recipients = batches.len();

        let sink = &self.sink;
        let sends = batches.into_iter().map(|(connection, message)| async move {
            let rows = message.len();
            let result = sink.send(&connection, message).await;
            (connection, rows, result)
        });

        let mut report = FlushReport {
            updates: updates.len(),
            recipients,
            ..FlushReport::default()
        };

        for (connection, rows, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::record_updates_delivered(rows as u64);
                }
                Err(err) => {
                    report.failed += 1;
                    metrics::record_delivery_failure(err.kind());
                    tracing::warn!(connection = %connection, rows, error = %err, "Failed to deliver updates");
                }
            }
        }

        metrics::record_flush(started.elapsed());
        tracing::debug!(
            updates = report.updates,
            recipients = report.recipients,
            failed = report.failed,
            "Flushed updates"
        );
        report
    }
}

/// Group updates into one message per matching subscriber.
fn route(
    updates: &[BondUpdate],
    subscriptions: Vec<(ConnectionId, SubscriptionFilter)>,
) -> Vec<(ConnectionId, PushMessage)> {
    subscriptions
        .into_iter()
        .filter_map(|(connection, filter)| {
            let matched: Vec<BondUpdate> = updates
                .iter()
                .filter(|update| filter.matches(&update.row.currency, &update.row.sector))
                .cloned()
                .collect();
            PushMessage::from_batch(matched).map(|message| (connection, message))
        })
        .collect()
}

// =============================================================================
// Flush Task Handle
// =============================================================================

/// Handle to a running flush task.
#[derive(Debug)]
pub struct FlushTask {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushTask {
    /// Stop the task after it has absorbed and flushed everything already
    /// staged. Safe to call more than once; later calls return once the
    /// task has finished.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut handle = self.handle.lock().await;
        if let Some(task) = handle.take()
            && let Err(err) = task.await
        {
            tracing::error!(error = %err, "Flush task ended abnormally");
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// =============================================================================
// Tests
// =============================================================================
