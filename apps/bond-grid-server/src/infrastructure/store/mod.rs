//! In-memory Bond Store
//!
//! Records sit in one flat list, each instrument's tiers contiguous, with an
//! index from instrument id to its slice. The layout is built once and never
//! changes shape; every record sits behind its own lock, so an update is
//! atomic with respect to that record only and readers of other records are
//! never blocked.
//!
//! Iteration follows instrument creation order, tiers in generation order.
//! A record's position in that order is stable for the life of the store.

mod generator;

use std::collections::HashMap;
use std::ops::Range;

use parking_lot::RwLock;

use crate::domain::bond::{Bond, MarketData};

pub use generator::{BondGenerator, DERIVED_TIERS, instrument_id, to_decimal};

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No instrument with this id.
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// The instrument has no such tier.
    #[error("Unknown tier {tier_id} for instrument {instrument_id}")]
    UnknownTier {
        /// Instrument id.
        instrument_id: String,
        /// Tier label.
        tier_id: String,
    },

    /// No record at this position.
    #[error("No record at position {0}")]
    UnknownPosition(usize),
}

/// Bond records grouped by instrument.
#[derive(Debug, Default)]
pub struct BondStore {
    records: Vec<RwLock<Bond>>,
    instruments: HashMap<String, Range<usize>>,
    order: Vec<String>,
}

impl BondStore {
    /// Build a store from records, grouping tiers by instrument in
    /// first-encounter order.
    #[must_use]
    pub fn from_bonds(bonds: impl IntoIterator<Item = Bond>) -> Self {
        let mut grouped: Vec<(String, Vec<Bond>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for bond in bonds {
            let at = *positions
                .entry(bond.instrument_id.clone())
                .or_insert_with(|| {
                    grouped.push((bond.instrument_id.clone(), Vec::new()));
                    grouped.len() - 1
                });
            if let Some((_, tiers)) = grouped.get_mut(at) {
                tiers.push(bond);
            }
        }

        let mut store = Self::default();
        for (id, tiers) in grouped {
            let start = store.records.len();
            store.records.extend(tiers.into_iter().map(RwLock::new));
            store
                .instruments
                .insert(id.clone(), start..store.records.len());
            store.order.push(id);
        }
        store
    }

    /// Generate `count` instruments (`BOND0000`...), each with every tier.
    #[must_use]
    pub fn generate(count: usize, generator: &mut BondGenerator) -> Self {
        let store = Self::from_bonds((0..count).flat_map(|index| generator.instrument(index)));
        tracing::info!(
            instruments = store.instrument_count(),
            records = store.record_count(),
            "Generated bond dataset"
        );
        store
    }

    /// Copy of every record, in store order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Bond> {
        self.records.iter().map(|bond| bond.read().clone()).collect()
    }

    /// Copy of every tier of one instrument. Empty if unknown.
    #[must_use]
    pub fn tiers(&self, instrument_id: &str) -> Vec<Bond> {
        self.tier_slots(instrument_id)
            .map(|tiers| tiers.iter().map(|bond| bond.read().clone()).collect())
            .unwrap_or_default()
    }

    /// Copy of one record.
    #[must_use]
    pub fn get(&self, instrument_id: &str, tier_id: &str) -> Option<Bond> {
        self.slot(instrument_id, tier_id)
            .ok()
            .map(|bond| bond.read().clone())
    }

    /// Copy the market fields of `bond` onto the stored record with the
    /// same instrument and tier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the instrument or tier does not exist.
    pub fn update(&self, bond: &Bond) -> Result<(), StoreError> {
        self.update_market(&bond.instrument_id, &bond.tier_id, &bond.market())
            .map(|_| ())
    }

    /// Apply market fields to one record and return the updated copy.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the instrument or tier does not exist.
    pub fn update_market(
        &self,
        instrument_id: &str,
        tier_id: &str,
        market: &MarketData,
    ) -> Result<Bond, StoreError> {
        let slot = self.slot(instrument_id, tier_id)?;
        Ok(Self::write(slot, market))
    }

    /// Market fields of the record at `position` in store order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownPosition` past the last record.
    pub fn market_at(&self, position: usize) -> Result<MarketData, StoreError> {
        self.records
            .get(position)
            .map(|bond| bond.read().market())
            .ok_or(StoreError::UnknownPosition(position))
    }

    /// Apply market fields to the record at `position` and return the
    /// updated copy.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownPosition` past the last record.
    pub fn update_market_at(
        &self,
        position: usize,
        market: &MarketData,
    ) -> Result<Bond, StoreError> {
        self.records
            .get(position)
            .map(|slot| Self::write(slot, market))
            .ok_or(StoreError::UnknownPosition(position))
    }

    /// Instrument ids in creation order.
    #[must_use]
    pub fn instrument_ids(&self) -> &[String] {
        &self.order
    }

    /// Number of instruments.
    #[must_use]
    pub fn instrument_count(&self) -> usize {
        self.order.len()
    }

    /// Number of records across all tiers.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn write(slot: &RwLock<Bond>, market: &MarketData) -> Bond {
        let mut bond = slot.write();
        bond.apply_market(market);
        bond.clone()
    }

    fn tier_slots(&self, instrument_id: &str) -> Option<&[RwLock<Bond>]> {
        self.instruments
            .get(instrument_id)
            .and_then(|range| self.records.get(range.clone()))
    }

    fn slot(&self, instrument_id: &str, tier_id: &str) -> Result<&RwLock<Bond>, StoreError> {
        let tiers = self
            .tier_slots(instrument_id)
            .ok_or_else(|| StoreError::UnknownInstrument(instrument_id.to_string()))?;

        tiers
            .iter()
            .find(|bond| bond.read().tier_id == tier_id)
            .ok_or_else(|| StoreError::UnknownTier {
                instrument_id: instrument_id.to_string(),
                tier_id: tier_id.to_string(),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::bond::CANONICAL_TIER;
    use crate::domain::bond::tests::sample_bond;

    fn seeded_store(count: usize) -> BondStore {
        BondStore::generate(count, &mut BondGenerator::new(Some(1)))
    }

    #[test]
    fn generate_creates_five_tiers_per_instrument() {
        let store = seeded_store(12);
        assert_eq!(store.instrument_count(), 12);
        assert_eq!(store.record_count(), 60);
        assert_eq!(store.instrument_ids()[0], "BOND0000");
        assert_eq!(store.instrument_ids()[11], "BOND0011");
    }

    #[test]
    fn snapshot_follows_creation_order() {
        let store = seeded_store(3);
        let snapshot = store.snapshot();
        let canonical: Vec<_> = snapshot
            .iter()
            .filter(|b| b.is_canonical())
            .map(|b| b.instrument_id.as_str())
            .collect();
        assert_eq!(canonical, ["BOND0000", "BOND0001", "BOND0002"]);
        assert_eq!(snapshot[0].tier_id, CANONICAL_TIER);
        assert_eq!(snapshot[4].tier_id, "Tier5");
    }

    #[test]
    fn update_copies_market_fields_only() {
        let store = seeded_store(2);
        let before = store.get("BOND0001", "Tier3").unwrap();
        let canonical_before = store.get("BOND0001", CANONICAL_TIER).unwrap();

        let mut incoming = sample_bond("BOND0001", "Tier3");
        incoming.bid = dec!(50);
        incoming.ask = dec!(51);
        incoming.volume = 42;
        store.update(&incoming).unwrap();

        let after = store.get("BOND0001", "Tier3").unwrap();
        assert_eq!(after.bid, dec!(50));
        assert_eq!(after.ask, dec!(51));
        assert_eq!(after.volume, 42);
        assert_eq!(after.name, before.name);
        assert_eq!(after.issuer, before.issuer);
        assert_eq!(after.maturity_date, before.maturity_date);
        assert_eq!(after.rating, before.rating);
        assert_eq!(store.get("BOND0001", CANONICAL_TIER).unwrap(), canonical_before);
    }

    #[test]
    fn update_of_unknown_record_fails() {
        let store = seeded_store(1);
        assert_eq!(
            store.update(&sample_bond("NOPE", CANONICAL_TIER)),
            Err(StoreError::UnknownInstrument("NOPE".to_string()))
        );
        assert!(matches!(
            store.update(&sample_bond("BOND0000", "Tier9")),
            Err(StoreError::UnknownTier { .. })
        ));
    }

    #[test]
    fn interleaved_input_is_grouped_by_instrument() {
        let store = BondStore::from_bonds([
            sample_bond("B1", CANONICAL_TIER),
            sample_bond("B2", CANONICAL_TIER),
            sample_bond("B1", "Tier2"),
        ]);
        let order: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|b| (b.instrument_id, b.tier_id))
            .collect();
        assert_eq!(
            order,
            [
                ("B1".to_string(), CANONICAL_TIER.to_string()),
                ("B1".to_string(), "Tier2".to_string()),
                ("B2".to_string(), CANONICAL_TIER.to_string()),
            ]
        );
        assert_eq!(store.tiers("B1").len(), 2);
        assert_eq!(store.instrument_ids(), ["B1", "B2"]);
    }

    #[test]
    fn positional_access_follows_snapshot_order() {
        let store = seeded_store(2);
        let snapshot = store.snapshot();
        assert_eq!(store.market_at(6).unwrap(), snapshot[6].market());

        let mut market = snapshot[6].market();
        market.volume = 7;
        let updated = store.update_market_at(6, &market).unwrap();
        assert_eq!(updated.instrument_id, snapshot[6].instrument_id);
        assert_eq!(updated.tier_id, snapshot[6].tier_id);
        assert_eq!(store.snapshot()[6].volume, 7);

        assert_eq!(store.market_at(10), Err(StoreError::UnknownPosition(10)));
        assert_eq!(
            store.update_market_at(10, &market),
            Err(StoreError::UnknownPosition(10))
        );
    }

    #[test]
    fn lookups_of_unknown_ids_are_empty() {
        let store = seeded_store(1);
        assert!(store.tiers("BOND9999").is_empty());
        assert!(store.get("BOND0000", "Tier9").is_none());
    }

    #[test]
    fn concurrent_updates_and_reads() {
        let store = Arc::new(seeded_store(4));

        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let id = instrument_id(worker);
                    for volume in 0..200 {
                        let mut bond = store.get(&id, CANONICAL_TIER).unwrap();
                        bond.volume = volume;
                        store.update(&bond).unwrap();
                        assert_eq!(store.snapshot().len(), 20);
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }

        for id in store.instrument_ids() {
            assert_eq!(store.get(id, CANONICAL_TIER).unwrap().volume, 199);
        }
    }
}
