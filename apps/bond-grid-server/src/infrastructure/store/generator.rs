//! Mock Bond Dataset
//!
//! Generates instruments with one canonical tier plus four derived tiers.
//! Derived tiers tighten the canonical spread around the same mid price.

use chrono::{DateTime, Months, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::domain::bond::{Bond, CANONICAL_TIER};

/// Derived tiers and their spread/volume multipliers.
pub const DERIVED_TIERS: [(&str, Decimal); 4] = [
    ("Tier2", dec!(0.95)),
    ("Tier3", dec!(0.90)),
    ("Tier4", dec!(0.85)),
    ("Tier5", dec!(0.80)),
];

const ISSUERS: [&str; 13] = [
    "US Government",
    "German Government",
    "UK Government",
    "Apple Inc",
    "Microsoft Corp",
    "Google Inc",
    "Goldman Sachs",
    "JPMorgan Chase",
    "Bank of America",
    "Wells Fargo",
    "City of New York",
    "State of California",
    "Municipality of London",
];

const RATINGS: [&str; 10] = [
    "AAA", "AA+", "AA", "AA-", "A+", "A", "A-", "BBB+", "BBB", "BBB-",
];

/// Instrument id for the `index`-th generated bond (`BOND0000`, ...).
#[must_use]
pub fn instrument_id(index: usize) -> String {
    format!("BOND{index:04}")
}

/// Random bond generator.
#[derive(Debug)]
pub struct BondGenerator {
    rng: StdRng,
    today: DateTime<Utc>,
}

impl BondGenerator {
    /// Create a generator. A seed makes the identity and price fields
    /// reproducible; timestamps always come from the clock.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        Self { rng, today }
    }

    /// Canonical tier followed by every derived tier for one instrument.
    pub fn instrument(&mut self, index: usize) -> Vec<Bond> {
        let canonical = self.canonical(index);
        let mut tiers = Vec::with_capacity(DERIVED_TIERS.len() + 1);
        for (tier_id, multiplier) in DERIVED_TIERS {
            tiers.push(self.derived(&canonical, tier_id, multiplier));
        }
        tiers.insert(0, canonical);
        tiers
    }

    fn canonical(&mut self, index: usize) -> Bond {
        let id = instrument_id(index);
        let currency = self.weighted(&[(0.4, "EUR"), (0.7, "GBP")], "USD");
        let sector = self.weighted(&[(0.5, "Government"), (0.8, "Corporate")], "Municipal");
        let issuer = ISSUERS[self.rng.random_range(0..ISSUERS.len())];
        let rating = RATINGS[self.rng.random_range(0..RATINGS.len())];

        let base = Decimal::from(self.rng.random_range(80..120i64)) + self.unit();
        let spread = self.scaled(2.0, 0.1);
        let years = self.rng.random_range(1..=30u32);
        let maturity_date = self
            .today
            .checked_add_months(Months::new(years * 12))
            .unwrap_or(self.today);

        Bond {
            name: format!("{issuer} Bond {}", index + 1),
            issuer: issuer.to_string(),
            currency: currency.to_string(),
            sector: sector.to_string(),
            maturity_date,
            coupon_rate: self.scaled(8.0, 1.0),
            face_value: dec!(1000),
            bid: base - spread / Decimal::TWO,
            ask: base + spread / Decimal::TWO,
            yield_rate: self.scaled(6.0, 1.0),
            opening_price: base - self.scaled(2.0, -1.0),
            closing_price: base + self.scaled(2.0, -1.0),
            last_price: base,
            volume: self.rng.random_range(100..10_000),
            update_time: Utc::now(),
            rating: rating.to_string(),
            isin: format!("US{id}"),
            cusip: format!("{id}7"),
            tier_id: CANONICAL_TIER.to_string(),
            instrument_id: id,
        }
    }

    fn derived(&mut self, canonical: &Bond, tier_id: &str, multiplier: Decimal) -> Bond {
        let spread = canonical.spread() * multiplier;
        let mid = canonical.mid();
        let volume = (Decimal::from(canonical.volume) * multiplier)
            .trunc()
            .to_i64()
            .unwrap_or(canonical.volume);

        Bond {
            bid: mid - spread / Decimal::TWO,
            ask: mid + spread / Decimal::TWO,
            yield_rate: canonical.yield_rate + self.scaled(0.4, -0.2),
            volume,
            update_time: Utc::now(),
            tier_id: tier_id.to_string(),
            ..canonical.clone()
        }
    }

    fn weighted(&mut self, thresholds: &[(f64, &'static str)], rest: &'static str) -> &'static str {
        let draw: f64 = self.rng.random();
        thresholds
            .iter()
            .find(|(threshold, _)| draw < *threshold)
            .map_or(rest, |&(_, value)| value)
    }

    fn unit(&mut self) -> Decimal {
        self.scaled(1.0, 0.0)
    }

    /// `draw * scale + offset` for a uniform draw in `[0, 1)`.
    fn scaled(&mut self, scale: f64, offset: f64) -> Decimal {
        let draw: f64 = self.rng.random();
        to_decimal(draw.mul_add(scale, offset))
    }
}

/// Convert a float to a four-decimal-place `Decimal`.
#[must_use]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .unwrap_or_default()
        .round_dp(4)
}
