//! Price Tick Generator
//!
//! Periodically walks the market fields of a random sample of records,
//! writes them back to the store and stages them for broadcast.
//!
//! A cycle runs synchronously between two timer ticks, so cancellation is
//! only ever observed between cycles. A failed cycle is logged and followed
//! by a backoff pause; the loop itself never exits on error.
//!
//! Records are sampled by position, so only the chosen ones are read.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::distr::{Bernoulli, BernoulliError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use crate::domain::bond::{Bond, MarketData};
use crate::infrastructure::broadcast::UpdateBroadcaster;
use crate::infrastructure::config::TickerSettings;
use crate::infrastructure::metrics;
use crate::infrastructure::store::{BondStore, StoreError, to_decimal};

/// Lowest bid and yield a walk can produce.
pub const PRICE_FLOOR: Decimal = dec!(0.01);

/// Minimum gap kept between ask and bid.
pub const MIN_SPREAD: Decimal = dec!(0.01);

/// Tick generator errors.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// Update probability is not a valid probability.
    #[error("Invalid update probability: {0}")]
    Probability(#[from] BernoulliError),

    /// A record could not be written back.
    #[error("Store update failed: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Market Book
// =============================================================================

/// Positional read/write access to the records the generator walks.
pub trait MarketBook: Send + Sync {
    /// Number of records; positions run from zero up to this.
    fn record_count(&self) -> usize;

    /// Market fields of the record at `position`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the record cannot be read.
    fn market_at(&self, position: usize) -> Result<MarketData, StoreError>;

    /// Write market fields back and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the record cannot be written.
    fn update_market_at(&self, position: usize, market: &MarketData)
    -> Result<Bond, StoreError>;
}

impl MarketBook for BondStore {
    fn record_count(&self) -> usize {
        Self::record_count(self)
    }

    fn market_at(&self, position: usize) -> Result<MarketData, StoreError> {
        Self::market_at(self, position)
    }

    fn update_market_at(
        &self,
        position: usize,
        market: &MarketData,
    ) -> Result<Bond, StoreError> {
        Self::update_market_at(self, position, market)
    }
}

// =============================================================================
// Random Walk
// =============================================================================

/// Uniform draws for one step of the walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkDraws {
    /// Bid draw in `[0, 1)`.
    pub bid: f64,
    /// Ask draw in `[0, 1)`.
    pub ask: f64,
    /// Yield draw in `[0, 1)`.
    pub yield_rate: f64,
    /// Volume delta in `[-50, 100)`.
    pub volume: i64,
}

impl WalkDraws {
    fn sample<R: Rng>(rng: &mut R) -> Self {
        Self {
            bid: rng.random(),
            ask: rng.random(),
            yield_rate: rng.random(),
            volume: rng.random_range(-50..100i64),
        }
    }
}

/// Apply one step of the bounded random walk.
///
/// Bid and ask move by up to ±1%, yield by up to ±0.5%. Bid and yield never
/// drop below [`PRICE_FLOOR`], ask stays at least [`MIN_SPREAD`] above bid,
/// volume never goes negative, and the last price follows the new mid.
#[must_use]
pub fn walk(market: &MarketData, draws: WalkDraws, now: DateTime<Utc>) -> MarketData {
    let bid = (market.bid * drift(draws.bid, 0.02))
        .round_dp(4)
        .max(PRICE_FLOOR);
    let ask = (market.ask * drift(draws.ask, 0.02))
        .round_dp(4)
        .max(bid + MIN_SPREAD);
    let yield_rate = (market.yield_rate * drift(draws.yield_rate, 0.01))
        .round_dp(4)
        .max(PRICE_FLOOR);

    MarketData {
        bid,
        ask,
        yield_rate,
        last_price: ((bid + ask) / Decimal::TWO).round_dp(4),
        volume: market.volume.saturating_add(draws.volume).max(0),
        update_time: now,
        ..*market
    }
}

/// `1 + (draw - 0.5) * width`
fn drift(draw: f64, width: f64) -> Decimal {
    to_decimal((draw - 0.5).mul_add(width, 1.0))
}

// =============================================================================
// Statistics
// =============================================================================

/// Running totals for the generator.
#[derive(Debug, Default)]
pub struct TickStats {
    cycles: AtomicU64,
    failures: AtomicU64,
    mutated: AtomicU64,
}

impl TickStats {
    /// Completed cycles.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Failed cycles.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Records changed across all cycles.
    #[must_use]
    pub fn mutated(&self) -> u64 {
        self.mutated.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Periodic market simulator.
pub struct TickGenerator {
    settings: TickerSettings,
    sampler: Bernoulli,
    rng: StdRng,
    book: Arc<dyn MarketBook>,
    broadcaster: UpdateBroadcaster,
    stats: Arc<TickStats>,
    cancel: CancellationToken,
}

impl TickGenerator {
    /// Create a generator. A seed makes the sampled records and walk
    /// reproducible.
    ///
    /// # Errors
    ///
    /// Returns `TickError::Probability` if the update probability is not in
    /// `[0, 1]`.
    pub fn new(
        settings: TickerSettings,
        seed: Option<u64>,
        book: Arc<dyn MarketBook>,
        broadcaster: UpdateBroadcaster,
        cancel: CancellationToken,
    ) -> Result<Self, TickError> {
        let sampler = Bernoulli::new(settings.update_probability)?;
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Ok(Self {
            settings,
            sampler,
            rng,
            book,
            broadcaster,
            stats: Arc::new(TickStats::default()),
            cancel,
        })
    }

    /// Shared statistics handle.
    #[must_use]
    pub fn stats(&self) -> Arc<TickStats> {
        Arc::clone(&self.stats)
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = self.settings.interval.as_millis(),
            update_probability = self.settings.update_probability,
            "Tick generator started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.tick_once() {
                        self.stats.failures.fetch_add(1, Ordering::Relaxed);
                        metrics::record_tick_failure();
                        tracing::error!(
                            error = %err,
                            backoff_ms = self.settings.failure_backoff.as_millis(),
                            "Tick cycle failed"
                        );

                        tokio::select! {
                            () = self.cancel.cancelled() => break,
                            () = tokio::time::sleep(self.settings.failure_backoff) => {}
                        }
                    }
                }
            }
        }

        tracing::info!(
            cycles = self.stats.cycles(),
            mutated = self.stats.mutated(),
            "Tick generator stopped"
        );
    }

    /// Run one cycle and return how many records changed.
    ///
    /// # Errors
    ///
    /// Returns `TickError::Store` if a sampled record cannot be read or
    /// written. Records already written in this cycle keep their new values
    /// and stay staged.
    pub fn tick_once(&mut self) -> Result<usize, TickError> {
        let now = Utc::now();
        let mut mutated = 0;

        for position in 0..self.book.record_count() {
            if !self.rng.sample(self.sampler) {
                continue;
            }

            let market = self.book.market_at(position)?;
            let next = walk(&market, WalkDraws::sample(&mut self.rng), now);
            let updated = self.book.update_market_at(position, &next)?;
            self.broadcaster.stage(&updated);
            mutated += 1;
        }

        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        self.stats
            .mutated
            .fetch_add(mutated as u64, Ordering::Relaxed);
        metrics::record_tick(mutated as u64);
        tracing::trace!(mutated, "Tick cycle complete");
        Ok(mutated)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::application::ports::{PushMessage, SinkError, UpdateSink};
    use crate::domain::bond::CANONICAL_TIER;
    use crate::domain::bond::tests::sample_bond;
    use crate::domain::subscription::{ConnectionId, SubscriptionFilter, SubscriptionRegistry};

    struct NullSink;

    #[async_trait::async_trait]
    impl UpdateSink for NullSink {
        async fn send(&self, _: &ConnectionId, _: PushMessage) -> Result<(), SinkError> {
            Ok(())
        }
    }

    const CALM: WalkDraws = WalkDraws {
        bid: 0.5,
        ask: 0.5,
        yield_rate: 0.5,
        volume: 0,
    };

    fn settings(update_probability: f64) -> TickerSettings {
        TickerSettings {
            interval: Duration::from_millis(10),
            update_probability,
            failure_backoff: Duration::from_millis(50),
        }
    }

    /// Store wrapper whose first `failing` writes are rejected.
    struct FlakyBook {
        store: BondStore,
        failing: AtomicUsize,
    }

    impl MarketBook for FlakyBook {
        fn record_count(&self) -> usize {
            self.store.record_count()
        }

        fn market_at(&self, position: usize) -> Result<MarketData, StoreError> {
            self.store.market_at(position)
        }

        fn update_market_at(
            &self,
            position: usize,
            market: &MarketData,
        ) -> Result<Bond, StoreError> {
            let rejected = self
                .failing
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
                    left.checked_sub(1)
                })
                .is_ok();
            if rejected {
                return Err(StoreError::UnknownPosition(position));
            }
            self.store.update_market_at(position, market)
        }
    }

    fn generator(
        store: Arc<dyn MarketBook>,
        update_probability: f64,
        cancel: CancellationToken,
    ) -> TickGenerator {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.subscribe(ConnectionId::from("c1"), SubscriptionFilter::all());
        let (broadcaster, _task) =
            UpdateBroadcaster::start(registry, Arc::new(NullSink), Duration::from_secs(3600));
        TickGenerator::new(settings(update_probability), Some(3), store, broadcaster, cancel)
            .unwrap()
    }

    fn market(bond: &Bond) -> MarketData {
        bond.market()
    }

    #[test]
    fn neutral_draws_keep_prices_and_follow_mid() {
        let bond = sample_bond("B1", CANONICAL_TIER);
        let now = Utc::now();
        let next = walk(&market(&bond), CALM, now);

        assert_eq!(next.bid, bond.bid);
        assert_eq!(next.ask, bond.ask);
        assert_eq!(next.yield_rate, bond.yield_rate);
        assert_eq!(next.last_price, bond.mid());
        assert_eq!(next.update_time, now);
        assert_eq!(next.opening_price, bond.opening_price);
    }

    #[test]
    fn moves_stay_within_one_percent() {
        let bond = sample_bond("B1", CANONICAL_TIER);
        let up = walk(
            &market(&bond),
            WalkDraws {
                bid: 0.999_999,
                ask: 0.999_999,
                yield_rate: 0.999_999,
                volume: 99,
            },
            Utc::now(),
        );

        assert!(up.bid <= bond.bid * dec!(1.01));
        assert!(up.ask <= bond.ask * dec!(1.01));
        assert!(up.yield_rate <= bond.yield_rate * dec!(1.005));
        assert_eq!(up.volume, bond.volume + 99);
    }

    #[test]
    fn floors_hold_for_tiny_values() {
        let mut bond = sample_bond("B1", CANONICAL_TIER);
        bond.bid = dec!(0.01);
        bond.ask = dec!(0.005);
        bond.yield_rate = dec!(0.01);
        bond.volume = 10;

        let next = walk(
            &market(&bond),
            WalkDraws {
                bid: 0.0,
                ask: 0.0,
                yield_rate: 0.0,
                volume: -50,
            },
            Utc::now(),
        );

        assert_eq!(next.bid, PRICE_FLOOR);
        assert_eq!(next.ask, PRICE_FLOOR + MIN_SPREAD);
        assert_eq!(next.yield_rate, PRICE_FLOOR);
        assert_eq!(next.volume, 0);
    }

    #[tokio::test]
    async fn invalid_probability_is_rejected() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (broadcaster, _task) =
            UpdateBroadcaster::start(registry, Arc::new(NullSink), Duration::from_secs(1));

        let result = TickGenerator::new(
            settings(1.5),
            None,
            Arc::new(BondStore::default()),
            broadcaster,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(TickError::Probability(_))));
    }

    #[tokio::test]
    async fn certain_probability_touches_every_record() {
        let store = Arc::new(BondStore::from_bonds([
            sample_bond("B1", CANONICAL_TIER),
            sample_bond("B1", "Tier2"),
            sample_bond("B2", CANONICAL_TIER),
        ]));
        let mut ticker = generator(
            Arc::clone(&store) as Arc<dyn MarketBook>,
            1.0,
            CancellationToken::new(),
        );

        assert_eq!(ticker.tick_once().unwrap(), 3);
        assert_eq!(ticker.stats().cycles(), 1);
        assert_eq!(ticker.stats().mutated(), 3);
        for bond in store.snapshot() {
            assert_eq!(bond.last_price, bond.mid().round_dp(4));
            assert!(bond.ask >= bond.bid + MIN_SPREAD);
        }
    }

    #[tokio::test]
    async fn zero_probability_changes_nothing() {
        let original = sample_bond("B1", CANONICAL_TIER);
        let store = Arc::new(BondStore::from_bonds([original.clone()]));
        let mut ticker = generator(
            Arc::clone(&store) as Arc<dyn MarketBook>,
            0.0,
            CancellationToken::new(),
        );

        assert_eq!(ticker.tick_once().unwrap(), 0);
        assert_eq!(store.get("B1", CANONICAL_TIER), Some(original));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancellation() {
        let store = Arc::new(BondStore::from_bonds([sample_bond("B1", CANONICAL_TIER)]));
        let cancel = CancellationToken::new();
        let ticker = generator(store, 0.5, cancel.clone());
        let stats = ticker.stats();
        let handle = tokio::spawn(ticker.run());

        tokio::time::sleep(Duration::from_millis(55)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(stats.cycles() >= 5);
        assert_eq!(stats.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_backs_off_and_continues() {
        let book = Arc::new(FlakyBook {
            store: BondStore::from_bonds([
                sample_bond("B1", CANONICAL_TIER),
                sample_bond("B2", CANONICAL_TIER),
            ]),
            failing: AtomicUsize::new(2),
        });
        let cancel = CancellationToken::new();
        let ticker = generator(
            Arc::clone(&book) as Arc<dyn MarketBook>,
            1.0,
            cancel.clone(),
        );
        let stats = ticker.stats();
        let handle = tokio::spawn(ticker.run());

        // Two failing cycles, each followed by a 50ms backoff.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.failures(), 2);
        assert!(stats.cycles() >= 3, "cycles = {}", stats.cycles());
        assert!(!handle.is_finished());
        assert!(stats.mutated() >= 2);
        assert_ne!(
            book.store.get("B2", CANONICAL_TIER),
            Some(sample_bond("B2", CANONICAL_TIER))
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
