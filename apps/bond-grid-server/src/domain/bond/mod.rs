//! Bond Records
//!
//! A bond instrument is stored as several pricing tiers. The canonical tier
//! (`Tier1`) is the instrument's headline record; derived tiers share its
//! identity fields but carry independent market fields.
//!
//! Identity fields never change after generation. Market fields are the
//! unit of update: see [`MarketData`] and [`Bond::apply_market`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::grid::TieredRecord;
use crate::domain::query::{Column, ColumnKind, FieldValue, Record, Schema};

/// Tier label of the canonical record of every instrument.
pub const CANONICAL_TIER: &str = "Tier1";

// =============================================================================
// Bond
// =============================================================================

/// One pricing tier of a bond instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    /// Instrument identifier, e.g. `BOND0042`.
    pub instrument_id: String,
    /// Display name.
    pub name: String,
    /// Issuing entity.
    pub issuer: String,
    /// ISO currency code.
    pub currency: String,
    /// Issuer sector (Government, Corporate, Municipal).
    pub sector: String,
    /// Maturity date.
    pub maturity_date: DateTime<Utc>,
    /// Annual coupon rate in percent.
    pub coupon_rate: Decimal,
    /// Face value.
    pub face_value: Decimal,
    /// Bid price.
    pub bid: Decimal,
    /// Ask price.
    pub ask: Decimal,
    /// Yield in percent.
    pub yield_rate: Decimal,
    /// Opening price of the session.
    pub opening_price: Decimal,
    /// Closing price of the previous session.
    pub closing_price: Decimal,
    /// Last traded (mid) price.
    pub last_price: Decimal,
    /// Traded volume.
    pub volume: i64,
    /// Time of the last market update.
    pub update_time: DateTime<Utc>,
    /// Credit rating.
    pub rating: String,
    /// ISIN code.
    pub isin: String,
    /// CUSIP code.
    pub cusip: String,
    /// Pricing tier label.
    pub tier_id: String,
}

impl Bond {
    /// Ask minus bid. Derived, never stored.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Midpoint of bid and ask.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Whether this is the canonical tier of its instrument.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.tier_id == CANONICAL_TIER
    }

    /// The mutable market fields of this record.
    #[must_use]
    pub fn market(&self) -> MarketData {
        MarketData {
            bid: self.bid,
            ask: self.ask,
            yield_rate: self.yield_rate,
            opening_price: self.opening_price,
            closing_price: self.closing_price,
            last_price: self.last_price,
            volume: self.volume,
            update_time: self.update_time,
        }
    }

    /// Overwrite the market fields, leaving identity untouched.
    pub fn apply_market(&mut self, market: &MarketData) {
        self.bid = market.bid;
        self.ask = market.ask;
        self.yield_rate = market.yield_rate;
        self.opening_price = market.opening_price;
        self.closing_price = market.closing_price;
        self.last_price = market.last_price;
        self.volume = market.volume;
        self.update_time = market.update_time;
    }

    /// Full client projection, including the derived spread.
    #[must_use]
    pub fn to_row(&self) -> BondRow {
        BondRow {
            instrument_id: self.instrument_id.clone(),
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            currency: self.currency.clone(),
            sector: self.sector.clone(),
            maturity_date: self.maturity_date,
            coupon_rate: self.coupon_rate,
            face_value: self.face_value,
            bid: self.bid,
            ask: self.ask,
            spread: self.spread(),
            yield_rate: self.yield_rate,
            opening_price: self.opening_price,
            closing_price: self.closing_price,
            last_price: self.last_price,
            volume: self.volume,
            update_time: self.update_time,
            rating: self.rating.clone(),
            isin: self.isin.clone(),
            cusip: self.cusip.clone(),
            tier_id: self.tier_id.clone(),
        }
    }
}

/// The mutable subset of a [`Bond`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketData {
    /// Bid price.
    pub bid: Decimal,
    /// Ask price.
    pub ask: Decimal,
    /// Yield in percent.
    pub yield_rate: Decimal,
    /// Opening price.
    pub opening_price: Decimal,
    /// Closing price.
    pub closing_price: Decimal,
    /// Last price.
    pub last_price: Decimal,
    /// Traded volume.
    pub volume: i64,
    /// Time of the update.
    pub update_time: DateTime<Utc>,
}

// =============================================================================
// Client Projection
// =============================================================================

/// Bond as sent to grid clients, with `spread` materialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondRow {
    /// Instrument identifier.
    pub instrument_id: String,
    /// Display name.
    pub name: String,
    /// Issuing entity.
    pub issuer: String,
    /// Currency code.
    pub currency: String,
    /// Sector.
    pub sector: String,
    /// Maturity date.
    pub maturity_date: DateTime<Utc>,
    /// Coupon rate.
    #[serde(with = "rust_decimal::serde::float")]
    pub coupon_rate: Decimal,
    /// Face value.
    #[serde(with = "rust_decimal::serde::float")]
    pub face_value: Decimal,
    /// Bid price.
    #[serde(with = "rust_decimal::serde::float")]
    pub bid: Decimal,
    /// Ask price.
    #[serde(with = "rust_decimal::serde::float")]
    pub ask: Decimal,
    /// Ask minus bid.
    #[serde(with = "rust_decimal::serde::float")]
    pub spread: Decimal,
    /// Yield.
    #[serde(rename = "yield", with = "rust_decimal::serde::float")]
    pub yield_rate: Decimal,
    /// Opening price.
    #[serde(with = "rust_decimal::serde::float")]
    pub opening_price: Decimal,
    /// Closing price.
    #[serde(with = "rust_decimal::serde::float")]
    pub closing_price: Decimal,
    /// Last price.
    #[serde(with = "rust_decimal::serde::float")]
    pub last_price: Decimal,
    /// Volume.
    pub volume: i64,
    /// Last update time.
    pub update_time: DateTime<Utc>,
    /// Credit rating.
    pub rating: String,
    /// ISIN.
    pub isin: String,
    /// CUSIP.
    pub cusip: String,
    /// Tier label.
    pub tier_id: String,
}

// =============================================================================
// Schema
// =============================================================================

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

static BOND_SCHEMA: LazyLock<Schema<Bond>> = LazyLock::new(|| {
    use ColumnKind::{Number, Temporal, Text};
    use FieldValue::{Integer, Timestamp};

    Schema::new(vec![
        Column::new("InstrumentId", Text, |b: &Bond| text(&b.instrument_id)),
        Column::new("Name", Text, |b: &Bond| text(&b.name)),
        Column::new("Issuer", Text, |b: &Bond| text(&b.issuer)),
        Column::new("Currency", Text, |b: &Bond| text(&b.currency)),
        Column::new("Sector", Text, |b: &Bond| text(&b.sector)),
        Column::new("MaturityDate", Temporal, |b: &Bond| Timestamp(b.maturity_date)),
        Column::new("CouponRate", Number, |b: &Bond| FieldValue::Number(b.coupon_rate)),
        Column::new("FaceValue", Number, |b: &Bond| FieldValue::Number(b.face_value)),
        Column::new("Bid", Number, |b: &Bond| FieldValue::Number(b.bid)),
        Column::new("Ask", Number, |b: &Bond| FieldValue::Number(b.ask)),
        Column::new("Spread", Number, |b: &Bond| FieldValue::Number(b.spread())),
        Column::new("Yield", Number, |b: &Bond| FieldValue::Number(b.yield_rate)),
        Column::new("OpeningPrice", Number, |b: &Bond| FieldValue::Number(b.opening_price)),
        Column::new("ClosingPrice", Number, |b: &Bond| FieldValue::Number(b.closing_price)),
        Column::new("LastPrice", Number, |b: &Bond| FieldValue::Number(b.last_price)),
        Column::new("Volume", Number, |b: &Bond| Integer(b.volume)),
        Column::new("UpdateTime", Temporal, |b: &Bond| Timestamp(b.update_time)),
        Column::new("Rating", Text, |b: &Bond| text(&b.rating)),
        Column::new("Isin", Text, |b: &Bond| text(&b.isin)),
        Column::new("Cusip", Text, |b: &Bond| text(&b.cusip)),
        Column::new("TierId", Text, |b: &Bond| text(&b.tier_id)),
    ])
});

impl Record for Bond {
    fn schema() -> &'static Schema<Self> {
        &BOND_SCHEMA
    }
}

impl TieredRecord for Bond {
    type Row = BondRow;

    fn parent_key(&self) -> &str {
        &self.instrument_id
    }

    fn is_canonical(&self) -> bool {
        Self::is_canonical(self)
    }

    fn to_row(&self) -> BondRow {
        Self::to_row(self)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::Value;

    use super::*;

    /// A fully populated bond for tests.
    pub(crate) fn sample_bond(instrument_id: &str, tier_id: &str) -> Bond {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        Bond {
            instrument_id: instrument_id.to_string(),
            name: format!("US Government Bond {instrument_id}"),
            issuer: "US Government".to_string(),
            currency: "USD".to_string(),
            sector: "Government".to_string(),
            maturity_date: Utc.with_ymd_and_hms(2035, 1, 2, 0, 0, 0).unwrap(),
            coupon_rate: dec!(4.25),
            face_value: dec!(1000),
            bid: dec!(99.50),
            ask: dec!(100.25),
            yield_rate: dec!(4.1),
            opening_price: dec!(99.8),
            closing_price: dec!(100.1),
            last_price: dec!(99.875),
            volume: 1_500,
            update_time: at,
            rating: "AA+".to_string(),
            isin: format!("US{instrument_id}"),
            cusip: format!("{instrument_id}7"),
            tier_id: tier_id.to_string(),
        }
    }

    #[test]
    fn spread_is_derived() {
        let mut bond = sample_bond("BOND0001", CANONICAL_TIER);
        assert_eq!(bond.spread(), dec!(0.75));
        bond.ask = dec!(101);
        assert_eq!(bond.spread(), dec!(1.50));
    }

    #[test]
    fn apply_market_leaves_identity_untouched() {
        let mut bond = sample_bond("BOND0001", "Tier3");
        let mut other = sample_bond("OTHER", CANONICAL_TIER);
        other.bid = dec!(1);
        other.ask = dec!(2);
        other.volume = 7;

        bond.apply_market(&other.market());

        assert_eq!(bond.bid, dec!(1));
        assert_eq!(bond.ask, dec!(2));
        assert_eq!(bond.volume, 7);
        assert_eq!(bond.instrument_id, "BOND0001");
        assert_eq!(bond.tier_id, "Tier3");
        assert_eq!(bond.isin, "USBOND0001");
    }

    #[test]
    fn schema_resolves_client_column_ids() {
        let schema = Bond::schema();
        let bond = sample_bond("BOND0001", CANONICAL_TIER);
        assert_eq!(schema.resolve("instrumentId").unwrap().text(&bond), "BOND0001");
        assert_eq!(schema.resolve("maturity_date").unwrap().kind(), ColumnKind::Temporal);
        assert_eq!(schema.resolve("spread").unwrap().text(&bond), "0.75");
        assert_eq!(schema.resolve("tier id").unwrap().text(&bond), "Tier1");
        assert_eq!(schema.columns().len(), 21);
    }

    #[test]
    fn row_projection_serializes_camel_case_numbers() {
        let row = sample_bond("BOND0001", CANONICAL_TIER).to_row();
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["instrumentId"], "BOND0001");
        assert_eq!(json["tierId"], "Tier1");
        assert_eq!(json["spread"], Value::from(0.75));
        assert_eq!(json["yield"], Value::from(4.1));
        assert_eq!(json["volume"], 1_500);
        assert!(json.get("yieldRate").is_none());
    }
}
